//! Daily schedules.
//!
//! Class periods send everyone to the class location, free periods rotate
//! through the persona's preferred places, rest periods send the agent
//! home. Memory-driven changes are made by the agent on top of this plan.

use std::fmt;

use scholar_core::{LocationKey, LocationMap};

use crate::config::{PeriodKind, Role, SchedulePrefs};

/// What an agent does during a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    /// The expert teaching class.
    Teach,
    /// A student in class.
    AttendClass,
    /// Free time somewhere quiet.
    Study,
    /// Free time somewhere social.
    Socialize,
    /// Going back to where something memorable happened.
    Revisit,
    /// Evening rest.
    Rest,
}

impl Activity {
    /// Past-tense phrase for activity memories.
    #[must_use]
    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Teach => "taught class",
            Self::AttendClass => "attended class",
            Self::Study => "studied",
            Self::Socialize => "spent time with friends",
            Self::Revisit => "went back",
            Self::Rest => "rested",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Teach => "teach",
            Self::AttendClass => "attend_class",
            Self::Study => "study",
            Self::Socialize => "socialize",
            Self::Revisit => "revisit",
            Self::Rest => "rest",
        };
        f.write_str(name)
    }
}

/// A planned `(activity, destination)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// What the agent will do.
    pub activity: Activity,
    /// Where.
    pub destination: LocationKey,
}

/// One agent's fixed weekly plan.
#[derive(Debug, Clone)]
pub struct Schedule {
    role: Role,
    class_location: LocationKey,
    free: Vec<LocationKey>,
    rest: LocationKey,
}

impl Schedule {
    /// Build from persona preferences. `home` is the rest fallback.
    #[must_use]
    pub fn new(role: Role, prefs: &SchedulePrefs, class_location: LocationKey, home: LocationKey) -> Self {
        Self {
            role,
            class_location,
            free: prefs.free.iter().map(|k| LocationKey::new(k.clone())).collect(),
            rest: prefs.rest.as_ref().map_or(home, |k| LocationKey::new(k.clone())),
        }
    }

    /// The planned slot for `period_index` of `day`.
    ///
    /// Returns `None` when the agent has nowhere to go during a free period.
    #[must_use]
    pub fn slot(&self, day: u32, period_index: u32, kind: PeriodKind, locations: &LocationMap) -> Option<Slot> {
        match kind {
            PeriodKind::Class => Some(Slot {
                activity: match self.role {
                    Role::Expert => Activity::Teach,
                    Role::Student => Activity::AttendClass,
                },
                destination: self.class_location.clone(),
            }),
            PeriodKind::Free => {
                if self.free.is_empty() {
                    return None;
                }
                let turn = usize::try_from(day.saturating_sub(1) + period_index).unwrap_or(0);
                let destination = self.free[turn % self.free.len()].clone();
                let activity = if locations.is_social(destination.as_str()) {
                    Activity::Socialize
                } else {
                    Activity::Study
                };
                Some(Slot { activity, destination })
            }
            PeriodKind::Rest => Some(Slot {
                activity: Activity::Rest,
                destination: self.rest.clone(),
            }),
        }
    }
}
