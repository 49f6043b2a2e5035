use crate::domain::log::Agent;
use std::fmt;

/// Which agent is currently active on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Step {
    #[default]
    Idle = 0,
    Shopping = 1,
    Merchant = 2,
    Credentials = 3,
    Payment = 4,
}

impl Step {
    /// Position of the step in the flow, `0` for idle.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Moves forward to `next`; never moves backwards.
    pub fn advance_to(&mut self, next: Step) {
        if next > *self {
            *self = next;
        }
    }

    /// Agent that is active during this step.
    pub fn agent(self) -> Option<Agent> {
        match self {
            Step::Idle => None,
            Step::Shopping => Some(Agent::Shopping),
            Step::Merchant => Some(Agent::Merchant),
            Step::Credentials => Some(Agent::Credentials),
            Step::Payment => Some(Agent::Payment),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.agent() {
            Some(agent) => write!(f, "{} ({})", self.index(), agent),
            None => write!(f, "{} (idle)", self.index()),
        }
    }
}
