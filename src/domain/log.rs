use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The logical actor that emitted a log message.
///
/// The four roles of the flow are recognised by name; anything else the backend
/// reports is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Agent {
    Shopping,
    Merchant,
    Credentials,
    Payment,
    Other(String),
}

impl Agent {
    pub fn name(&self) -> &str {
        match self {
            Agent::Shopping => "ShoppingAgent",
            Agent::Merchant => "MerchantAgent",
            Agent::Credentials => "CredentialsProvider",
            Agent::Payment => "PaymentProcessor",
            Agent::Other(name) => name,
        }
    }
}

impl From<String> for Agent {
    fn from(name: String) -> Self {
        match name.as_str() {
            "ShoppingAgent" => Agent::Shopping,
            "MerchantAgent" => Agent::Merchant,
            "CredentialsProvider" => Agent::Credentials,
            "PaymentProcessor" => Agent::Payment,
            _ => Agent::Other(name),
        }
    }
}

impl From<Agent> for String {
    fn from(agent: Agent) -> Self {
        match agent {
            Agent::Other(name) => name,
            known => known.name().to_string(),
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A message as emitted by an agent, before it enters the log stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLog {
    pub agent: Agent,
    pub message: String,
    /// Emission time reported by the backend, in milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl AgentLog {
    pub fn new(agent: Agent, message: impl Into<String>) -> Self {
        Self {
            agent,
            message: message.into(),
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogId(Uuid);

impl LogId {
    /// Creates a new random `LogId`.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// An [`AgentLog`] admitted to the log stream. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    id: LogId,
    log: AgentLog,
    emitted_at: DateTime<Utc>,
}

impl LogEntry {
    /// Stamps `log` with a fresh id and the current time.
    pub fn new(log: AgentLog) -> Self {
        Self {
            id: LogId::generate(),
            log,
            emitted_at: Utc::now(),
        }
    }

    pub fn id(&self) -> LogId {
        self.id
    }

    pub fn agent(&self) -> &Agent {
        &self.log.agent
    }

    pub fn message(&self) -> &str {
        &self.log.message
    }

    pub fn emitted_at(&self) -> DateTime<Utc> {
        self.emitted_at
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.emitted_at.format("%H:%M:%S"),
            self.log.agent,
            self.log.message
        )
    }
}
