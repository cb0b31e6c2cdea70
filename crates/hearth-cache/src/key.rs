//! Cache keys.

use std::fmt;

use hearth_core::HouseholdId;

/// Top-level family of cached reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryPrefix {
    /// Household record.
    Household,
    /// Member list.
    Members,
    /// Transactions.
    Transactions,
    /// Budgets.
    Budgets,
    /// Aggregated finance dashboard.
    FinanceSummary,
    /// Chores.
    Chores,
    /// Assets.
    Assets,
    /// Calendar events.
    CalendarEvents,
}

impl QueryPrefix {
    /// Every prefix.
    pub const ALL: [Self; 8] = [
        Self::Household,
        Self::Members,
        Self::Transactions,
        Self::Budgets,
        Self::FinanceSummary,
        Self::Chores,
        Self::Assets,
        Self::CalendarEvents,
    ];

    /// Key segment as used by the application's query layer.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Household => "household",
            Self::Members => "members",
            Self::Transactions => "transactions",
            Self::Budgets => "budgets",
            Self::FinanceSummary => "finance-summary",
            Self::Chores => "chores",
            Self::Assets => "assets",
            Self::CalendarEvents => "calendar-events",
        }
    }
}

impl fmt::Display for QueryPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one cached read: `[prefix, householdId, ...sub_key]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryKey {
    /// Query family.
    pub prefix: QueryPrefix,
    /// Household scope.
    pub household_id: HouseholdId,
    /// Remaining key segments (filters, ids, pages).
    pub sub_key: Option<String>,
}

impl QueryKey {
    /// Key for the whole family within a household.
    pub fn new(prefix: QueryPrefix, household_id: impl Into<HouseholdId>) -> Self {
        Self {
            prefix,
            household_id: household_id.into(),
            sub_key: None,
        }
    }

    /// Narrow the key.
    #[must_use]
    pub fn with_sub_key(mut self, sub_key: impl Into<String>) -> Self {
        self.sub_key = Some(sub_key.into());
        self
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.household_id)?;
        if let Some(sub) = &self.sub_key {
            write!(f, "/{sub}")?;
        }
        Ok(())
    }
}
