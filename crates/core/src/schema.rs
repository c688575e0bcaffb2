//! Relational schema catalog consumed by the SQL generation prompt.
//!
//! The catalog is a fixed, documented contract: base CRM tables plus
//! precomputed analytical views (`vw_*`). The generation prompt renders this
//! catalog verbatim and instructs the model to prefer the views over ad hoc
//! joins, biasing it toward known-safe, known-correct aggregations.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationDoc {
    pub name: &'static str,
    pub purpose: &'static str,
    pub columns: &'static [&'static str],
}

#[derive(Clone, Debug, Default)]
pub struct SchemaCatalog;

const BASE_TABLES: &[RelationDoc] = &[
    RelationDoc {
        name: "leads",
        purpose: "One row per lead: contact details, source, pipeline status, and value.",
        columns: &[
            "id",
            "name",
            "company",
            "email",
            "phone",
            "source",
            "status",
            "estimated_value",
            "assigned_to",
            "created_at",
            "updated_at",
        ],
    },
    RelationDoc {
        name: "sales_person",
        purpose: "Sales team roster; leads.assigned_to references sales_person.id.",
        columns: &["id", "name", "email", "region", "active", "hired_at"],
    },
    RelationDoc {
        name: "lead_activity",
        purpose: "Timestamped touchpoints (calls, emails, meetings, notes) per lead.",
        columns: &["id", "lead_id", "activity_type", "notes", "occurred_at", "created_by"],
    },
];

const ANALYTICAL_VIEWS: &[RelationDoc] = &[
    RelationDoc {
        name: "vw_lead_conversion_by_salesperson",
        purpose: "Per-salesperson totals: leads owned, won, lost, and conversion rate.",
        columns: &["salesperson_id", "salesperson_name", "total_leads", "won_leads", "lost_leads", "conversion_rate"],
    },
    RelationDoc {
        name: "vw_monthly_lead_trends",
        purpose: "Lead creation and win counts bucketed by calendar month.",
        columns: &["month", "new_leads", "won_leads", "total_estimated_value"],
    },
    RelationDoc {
        name: "vw_lead_source_performance",
        purpose: "Lead volume and win rate grouped by acquisition source.",
        columns: &["source", "total_leads", "won_leads", "win_rate", "avg_estimated_value"],
    },
    RelationDoc {
        name: "vw_activity_summary",
        purpose: "Activity counts per lead, split by activity type, with last-touch timestamp.",
        columns: &["lead_id", "lead_name", "call_count", "email_count", "meeting_count", "last_activity_at"],
    },
    RelationDoc {
        name: "vw_pipeline_value",
        purpose: "Open pipeline value aggregated by status and salesperson.",
        columns: &["status", "salesperson_name", "lead_count", "total_value"],
    },
];

impl SchemaCatalog {
    pub fn base_tables(&self) -> &'static [RelationDoc] {
        BASE_TABLES
    }

    pub fn views(&self) -> &'static [RelationDoc] {
        ANALYTICAL_VIEWS
    }

    /// Render the catalog as prompt text: one block per relation with its
    /// purpose and column list.
    pub fn render(&self) -> String {
        let mut out = String::from("Base tables:\n");
        for table in BASE_TABLES {
            render_relation(&mut out, table);
        }
        out.push_str("\nPrecomputed views (prefer these over joining base tables):\n");
        for view in ANALYTICAL_VIEWS {
            render_relation(&mut out, view);
        }
        out
    }
}

fn render_relation(out: &mut String, relation: &RelationDoc) {
    out.push_str("- ");
    out.push_str(relation.name);
    out.push('(');
    out.push_str(&relation.columns.join(", "));
    out.push_str(")\n  ");
    out.push_str(relation.purpose);
    out.push('\n');
}
