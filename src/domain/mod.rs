use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use uuid::Uuid;

/// Opaque caller identity supplied by the hosting ledger. Only ever compared
/// for equality; authenticity is the host's problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    pub fn new(raw: impl Into<String>) -> Result<Self, PrincipalError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(PrincipalError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(PrincipalError::Whitespace(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Principal {
    type Err = PrincipalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Principal {
    type Error = PrincipalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Principal> for String {
    fn from(p: Principal) -> Self {
        p.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrincipalError {
    #[error("principal must not be empty")]
    Empty,
    #[error("principal {0:?} contains whitespace")]
    Whitespace(String),
}

/// Errors returned by contract entry points. Each maps to a stable numeric
/// code that ends up in the transaction receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("caller is not authorized")]
    NotAuthorized,
    #[error("no arbitrage strategy is registered")]
    NotRegistered,
    #[error("amount exceeds the strategy capital limit")]
    CapitalExceeded,
    #[error("amount out must be strictly greater than amount in")]
    Unprofitable,
    #[error("an arbitrage strategy is already registered")]
    AlreadyRegistered,
    #[error("capital limit must be greater than zero")]
    InvalidCapitalLimit,
}

impl ContractError {
    pub const fn code(self) -> u32 {
        match self {
            ContractError::NotAuthorized => 200,
            ContractError::NotRegistered => 201,
            ContractError::CapitalExceeded => 202,
            ContractError::Unprofitable => 203,
            ContractError::AlreadyRegistered => 204,
            ContractError::InvalidCapitalLimit => 205,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub owner: Principal,
    pub capital_limit: u128,
    pub registered: bool,
}

/// Cumulative accounting of successful executions. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_trades: u128,
    pub total_profit: u128,
}

/// A state-changing call, tagged by its public entry-point name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "function", content = "args", rename_all = "kebab-case")]
pub enum ContractCall {
    #[serde(rename_all = "kebab-case")]
    RegisterArbitrageStrategy { owner: Principal, capital_limit: u128 },
    #[serde(rename_all = "kebab-case")]
    ExecuteArbitrage { amount_in: u128, amount_out: u128 },
}

const FUNCTIONS: &[&str] = &["register-arbitrage-strategy", "execute-arbitrage"];

impl ContractCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            ContractCall::RegisterArbitrageStrategy { .. } => FUNCTIONS[0],
            ContractCall::ExecuteArbitrage { .. } => FUNCTIONS[1],
        }
    }
}

#[derive(Deserialize)]
struct CallEnvelope {
    function: String,
    args: Box<RawValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RegisterArgs {
    owner: Principal,
    capital_limit: u128,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ExecuteArgs {
    amount_in: u128,
    amount_out: u128,
}

// `args` is captured raw and parsed once `function` is known, so key order in
// the envelope does not matter and `u128` never passes through serde's buffer.
impl<'de> Deserialize<'de> for ContractCall {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let envelope = CallEnvelope::deserialize(deserializer)?;
        let args = envelope.args.get();
        match envelope.function.as_str() {
            "register-arbitrage-strategy" => {
                let a: RegisterArgs = serde_json::from_str(args).map_err(de::Error::custom)?;
                Ok(ContractCall::RegisterArbitrageStrategy {
                    owner: a.owner,
                    capital_limit: a.capital_limit,
                })
            }
            "execute-arbitrage" => {
                let a: ExecuteArgs = serde_json::from_str(args).map_err(de::Error::custom)?;
                Ok(ContractCall::ExecuteArbitrage {
                    amount_in: a.amount_in,
                    amount_out: a.amount_out,
                })
            }
            other => Err(de::Error::unknown_variant(other, FUNCTIONS)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Uint(u128),
}

impl Value {
    /// Inverse of the `Display` form stored in the receipt table.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            n => n.parse().ok().map(Value::Uint),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Uint(n) => write!(f, "{}", n),
        }
    }
}

/// Tagged result of a call: `{"ok": value}` or `{"err": code}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallResult {
    Ok(Value),
    Err(u32),
}

impl CallResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, CallResult::Ok(_))
    }
}

impl From<Result<bool, ContractError>> for CallResult {
    fn from(r: Result<bool, ContractError>) -> Self {
        match r {
            Ok(b) => CallResult::Ok(Value::Bool(b)),
            Err(e) => CallResult::Err(e.code()),
        }
    }
}

impl From<Result<u128, ContractError>> for CallResult {
    fn from(r: Result<u128, ContractError>) -> Self {
        match r {
            Ok(n) => CallResult::Ok(Value::Uint(n)),
            Err(e) => CallResult::Err(e.code()),
        }
    }
}

impl std::fmt::Display for CallResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallResult::Ok(v) => write!(f, "(ok {})", v),
            CallResult::Err(code) => write!(f, "(err u{})", code),
        }
    }
}

/// Immutable record of one applied call.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub tx_id: Uuid,
    pub block_height: u64,
    pub sender: Principal,
    pub call: ContractCall,
    pub result: CallResult,
    pub timestamp: DateTime<Utc>,
}
