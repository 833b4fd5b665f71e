//! # Specification Evaluator
//!
//! Folds a [`Specification`] into a [`QueryPlan`].
//!
//! ## Evaluation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  base plan                                                              │
//! │     │                                                                   │
//! │     ├─ 1. criteria          → filter          (if present)              │
//! │     ├─ 2. order_by          → ORDER BY .. ASC (if present)              │
//! │     ├─ 3. order_by_desc     → ORDER BY .. DESC (only if no ascending)   │
//! │     ├─ 4. skip / take       → OFFSET / LIMIT  (only if paging enabled)  │
//! │     └─ 5. includes          → eager loads     (declaration order)       │
//! │     ▼                                                                   │
//! │  evaluated plan                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The evaluator never fails and never checks column names. Validation
//! happens when the database layer renders the plan.

use crate::plan::QueryPlan;
use crate::specification::{OrderBy, Specification};

/// Applies `spec` to `plan` and returns the transformed plan.
///
/// ## Arguments
/// * `plan` - The base plan, usually `QueryPlan::new()` with a tracking mode
/// * `spec` - The specification to apply
///
/// ## Returns
/// The plan with criteria, ordering, paging and includes appended.
pub fn evaluate<T>(plan: QueryPlan, spec: &Specification<T>) -> QueryPlan {
    let mut plan = plan;

    if let Some(criteria) = spec.criteria() {
        plan = plan.filter(criteria.clone());
    }

    if let Some(column) = spec.order_by_column() {
        plan = plan.order_by(OrderBy::asc(column));
    } else if let Some(column) = spec.order_by_descending_column() {
        plan = plan.order_by(OrderBy::desc(column));
    }

    if spec.is_paging_enabled() {
        plan = plan.skip(spec.skip()).take(spec.take());
    }

    for include in spec.includes() {
        plan = plan.include(include.clone());
    }

    plan
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::plan::Tracking;
    use crate::specification::SortDirection;

    struct Widget;

    #[test]
    fn test_empty_spec_leaves_plan_untouched() {
        let base = QueryPlan::new().with_tracking(Tracking::NoTracking);
        let plan = evaluate(base.clone(), &Specification::<Widget>::new());
        assert_eq!(plan, base);
    }

    #[test]
    fn test_criteria_is_appended_to_existing_filters() {
        let base = QueryPlan::new().filter(Filter::eq("is_deleted", false));
        let spec = Specification::<Widget>::new().with_criteria(Filter::gt("price_cents", 100_i64));

        let plan = evaluate(base, &spec);
        assert_eq!(
            plan.filters(),
            &[
                Filter::eq("is_deleted", false),
                Filter::gt("price_cents", 100_i64)
            ]
        );
    }

    #[test]
    fn test_ascending_wins_over_descending() {
        let spec = Specification::<Widget>::new()
            .order_by_descending("price_cents")
            .order_by("name");

        let plan = evaluate(QueryPlan::new(), &spec);
        assert_eq!(plan.ordering(), &[OrderBy::asc("name")]);
    }

    #[test]
    fn test_descending_applies_alone() {
        let spec = Specification::<Widget>::new().order_by_descending("price_cents");

        let plan = evaluate(QueryPlan::new(), &spec);
        assert_eq!(plan.ordering().len(), 1);
        assert_eq!(plan.ordering()[0].direction, SortDirection::Descending);
    }

    #[test]
    fn test_paging_applied_only_when_enabled() {
        let paged = Specification::<Widget>::new().apply_paging(20, 10);
        let plan = evaluate(QueryPlan::new(), &paged);
        assert_eq!(plan.offset(), Some(20));
        assert_eq!(plan.limit(), Some(10));

        let unpaged = Specification::<Widget>::new();
        let plan = evaluate(QueryPlan::new(), &unpaged);
        assert_eq!(plan.offset(), None);
        assert_eq!(plan.limit(), None);
    }

    #[test]
    fn test_includes_keep_declaration_order() {
        let spec = Specification::<Widget>::new()
            .include("parts")
            .include("supplier")
            .apply_paging(0, 5);

        let plan = evaluate(QueryPlan::new(), &spec);
        assert_eq!(plan.includes(), &["parts".to_string(), "supplier".to_string()]);
        assert_eq!(plan.limit(), Some(5));
    }
}
