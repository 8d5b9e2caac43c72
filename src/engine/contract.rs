use tracing::{info, warn};

use crate::domain::{CallResult, ContractCall, ContractError, ExecutionStats, Principal, StrategyRecord};

/// The arbitrage strategy contract. Owns the singleton strategy record and
/// enforces authorization and spread validation on every entry point.
///
/// Entry points validate everything before touching state, so a rejected call
/// never leaves a partial mutation behind.
#[derive(Debug, Clone)]
pub struct ArbitrageContract {
    admin: Principal,
    strategy: Option<StrategyRecord>,
    stats: ExecutionStats,
}

impl ArbitrageContract {
    /// Deploy a fresh contract. `admin` is fixed for the contract's lifetime.
    pub fn new(admin: Principal) -> Self {
        Self {
            admin,
            strategy: None,
            stats: ExecutionStats::default(),
        }
    }

    pub fn register_arbitrage_strategy(
        &mut self,
        caller: &Principal,
        owner: Principal,
        capital_limit: u128,
    ) -> Result<bool, ContractError> {
        if *caller != self.admin {
            warn!("Registration by {} rejected: not the admin", caller);
            return Err(ContractError::NotAuthorized);
        }
        if self.strategy.is_some() {
            warn!("Registration rejected: strategy already registered");
            return Err(ContractError::AlreadyRegistered);
        }
        if capital_limit == 0 {
            warn!("Registration rejected: zero capital limit");
            return Err(ContractError::InvalidCapitalLimit);
        }

        info!("Strategy registered for {} with capital limit {}", owner, capital_limit);
        self.strategy = Some(StrategyRecord {
            owner,
            capital_limit,
            registered: true,
        });
        Ok(true)
    }

    /// Returns the realized profit `amount_out - amount_in`.
    pub fn execute_arbitrage(
        &mut self,
        caller: &Principal,
        amount_in: u128,
        amount_out: u128,
    ) -> Result<u128, ContractError> {
        let strategy = self.strategy.as_ref().ok_or_else(|| {
            warn!("Execution by {} rejected: no strategy registered", caller);
            ContractError::NotRegistered
        })?;

        if *caller != strategy.owner {
            warn!("Execution by {} rejected: not the strategy owner", caller);
            return Err(ContractError::NotAuthorized);
        }

        if amount_in > strategy.capital_limit {
            warn!(
                "Execution rejected: amount in {} exceeds capital limit {}",
                amount_in, strategy.capital_limit
            );
            return Err(ContractError::CapitalExceeded);
        }

        if amount_out <= amount_in {
            warn!(
                "Execution rejected: non-positive spread ({} in, {} out)",
                amount_in, amount_out
            );
            return Err(ContractError::Unprofitable);
        }
        let profit = amount_out - amount_in;

        self.stats.total_trades = self.stats.total_trades.saturating_add(1);
        self.stats.total_profit = self.stats.total_profit.saturating_add(profit);
        info!("Arbitrage executed: {} in, {} out, profit {}", amount_in, amount_out, profit);
        Ok(profit)
    }

    /// Dispatch a tagged call and wrap its outcome for the receipt.
    pub fn call(&mut self, caller: &Principal, call: &ContractCall) -> CallResult {
        match call {
            ContractCall::RegisterArbitrageStrategy { owner, capital_limit } => self
                .register_arbitrage_strategy(caller, owner.clone(), *capital_limit)
                .into(),
            ContractCall::ExecuteArbitrage { amount_in, amount_out } => {
                self.execute_arbitrage(caller, *amount_in, *amount_out).into()
            }
        }
    }

    pub fn get_strategy(&self) -> Option<&StrategyRecord> {
        self.strategy.as_ref()
    }

    pub fn get_admin(&self) -> &Principal {
        &self.admin
    }

    pub fn get_stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn is_registered(&self) -> bool {
        self.strategy.as_ref().is_some_and(|s| s.registered)
    }
}
