//! Entity type to query prefix invalidation table.

use hearth_core::EntityType;

use crate::key::QueryPrefix;

/// Prefixes whose cached reads depend on `entity_type`.
///
/// Exhaustive: adding an `EntityType` variant fails to compile until it is
/// mapped here.
pub fn prefixes_for(entity_type: EntityType) -> &'static [QueryPrefix] {
    use QueryPrefix as P;
    match entity_type {
        EntityType::Household => &[P::Household, P::Members],
        EntityType::Member => &[P::Members, P::FinanceSummary],
        EntityType::Transaction => &[P::Transactions, P::FinanceSummary],
        EntityType::Budget => &[P::Budgets, P::FinanceSummary],
        EntityType::Chore => &[P::Chores],
        EntityType::Asset => &[P::Assets],
        EntityType::CalendarEvent => &[P::CalendarEvents],
    }
}
