//! JSON-RPC server for the Incentra node.
//!
//! Uses jsonrpsee 0.24 to expose every incentives operation and query, plus
//! a minimal bank interface for funding accounts and reading balances.
//! Addresses are `0x`-prefixed hex, rates are decimal strings and
//! allocations use the `denom:rate` form.

use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};

use incentra_core::distribution::DistributionReport;
use incentra_core::error::IncentiveError;
use incentra_core::genesis::GenesisState;
use incentra_core::{Address, Allocation, Denom, Incentive, Params, Rate, UsageMeter};

use crate::error::NodeError;
use crate::node::Node;

// --- Error codes ---

const ERR_INTERNAL: i32 = -1;
const ERR_INVALID_PARAMS: i32 = -8;
const ERR_NOT_FOUND: i32 = -5;
const ERR_REJECTED: i32 = -25;

/// JSON representation of node info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfoJson {
    /// Account the incentives are paid from.
    pub pool_address: String,
    /// Native denomination of the chain.
    pub native_denom: String,
    /// Last finished epoch.
    pub epoch_number: u64,
    /// Number of registered incentives.
    pub incentives: usize,
    /// Current module params.
    pub params: Params,
}

/// JSON representation of one account balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceJson {
    pub denom: String,
    pub amount: u64,
}

/// JSON representation of the total allocation of one denom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationMeterJson {
    pub denom: String,
    pub rate: Rate,
}

/// JSON representation of an epoch end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochJson {
    pub epoch_number: u64,
    /// Present when the epoch triggered a distribution.
    pub distribution: Option<DistributionReport>,
}

/// Parse a `0x`-prefixed or bare hex address.
pub fn parse_address(s: &str) -> Result<Address, ErrorObjectOwned> {
    s.parse()
        .map_err(|e| rpc_error(ERR_INVALID_PARAMS, &format!("invalid address {s:?}: {e}")))
}

/// Parse a denomination.
pub fn parse_denom(s: &str) -> Result<Denom, ErrorObjectOwned> {
    s.parse()
        .map_err(|e| rpc_error(ERR_INVALID_PARAMS, &format!("{e}")))
}

/// Parse a list of `denom:rate` allocations.
pub fn parse_allocations(items: &[String]) -> Result<Vec<Allocation>, ErrorObjectOwned> {
    items
        .iter()
        .map(|s| {
            s.parse()
                .map_err(|e| rpc_error(ERR_INVALID_PARAMS, &format!("invalid allocation {s:?}: {e}")))
        })
        .collect()
}

/// Create a JSON-RPC error.
fn rpc_error(code: i32, msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, msg.to_string(), None::<()>)
}

/// Map a module error onto a JSON-RPC error code.
fn module_error(e: IncentiveError) -> ErrorObjectOwned {
    let code = match &e {
        IncentiveError::NotFound { .. } => ERR_NOT_FOUND,
        IncentiveError::Storage(_) | IncentiveError::ArithmeticOverflow => ERR_INTERNAL,
        _ => ERR_REJECTED,
    };
    rpc_error(code, &e.to_string())
}

/// The Incentra JSON-RPC interface.
#[rpc(server)]
pub trait IncentraRpc {
    /// Returns general node info.
    #[method(name = "getinfo")]
    async fn get_info(&self) -> Result<NodeInfoJson, ErrorObjectOwned>;

    /// Returns the module params.
    #[method(name = "getparams")]
    async fn get_params(&self) -> Result<Params, ErrorObjectOwned>;

    /// Replaces the module params.
    #[method(name = "setparams")]
    async fn set_params(&self, params: Params) -> Result<Params, ErrorObjectOwned>;

    /// Returns the incentive registered for a contract.
    #[method(name = "getincentive")]
    async fn get_incentive(&self, contract: String) -> Result<Incentive, ErrorObjectOwned>;

    /// Returns every registered incentive, ordered by contract.
    #[method(name = "getincentives")]
    async fn get_incentives(&self) -> Result<Vec<Incentive>, ErrorObjectOwned>;

    /// Registers an incentive for a contract.
    #[method(name = "registerincentive")]
    async fn register_incentive(
        &self,
        contract: String,
        allocations: Vec<String>,
        epochs: u32,
    ) -> Result<Incentive, ErrorObjectOwned>;

    /// Cancels the incentive of a contract and returns it.
    #[method(name = "cancelincentive")]
    async fn cancel_incentive(&self, contract: String) -> Result<Incentive, ErrorObjectOwned>;

    /// Records usage of a contract by a participant. Returns whether it was metered.
    #[method(name = "reportusage")]
    async fn report_usage(
        &self,
        contract: String,
        participant: String,
        delta: u64,
    ) -> Result<bool, ErrorObjectOwned>;

    /// Distributes rewards for every incentive immediately.
    #[method(name = "distribute")]
    async fn distribute(&self) -> Result<DistributionReport, ErrorObjectOwned>;

    /// Ends the next epoch under the given identifier.
    #[method(name = "endepoch")]
    async fn end_epoch(&self, epoch_identifier: String) -> Result<EpochJson, ErrorObjectOwned>;

    /// Returns one usage meter, if recorded.
    #[method(name = "getusagemeter")]
    async fn get_usage_meter(
        &self,
        contract: String,
        participant: String,
    ) -> Result<Option<UsageMeter>, ErrorObjectOwned>;

    /// Returns every usage meter of a contract.
    #[method(name = "getusagemeters")]
    async fn get_usage_meters(&self, contract: String) -> Result<Vec<UsageMeter>, ErrorObjectOwned>;

    /// Returns the total registered rate per denom.
    #[method(name = "getallocationmeters")]
    async fn get_allocation_meters(&self) -> Result<Vec<AllocationMeterJson>, ErrorObjectOwned>;

    /// Returns the total registered rate of one denom.
    #[method(name = "getallocationmeter")]
    async fn get_allocation_meter(&self, denom: String) -> Result<Rate, ErrorObjectOwned>;

    /// Mints funds into an account (the incentive pool if none is given).
    #[method(name = "fund")]
    async fn fund(
        &self,
        denom: String,
        amount: u64,
        account: Option<String>,
    ) -> Result<u64, ErrorObjectOwned>;

    /// Returns the balance of one account in one denom.
    #[method(name = "getbalance")]
    async fn get_balance(&self, account: String, denom: String) -> Result<u64, ErrorObjectOwned>;

    /// Returns every nonzero balance of an account.
    #[method(name = "getbalances")]
    async fn get_balances(&self, account: String) -> Result<Vec<BalanceJson>, ErrorObjectOwned>;

    /// Exports the module genesis state.
    #[method(name = "exportgenesis")]
    async fn export_genesis(&self) -> Result<GenesisState, ErrorObjectOwned>;
}

/// Implementation of the Incentra JSON-RPC server.
pub struct RpcServerImpl {
    node: Arc<Node>,
}

impl RpcServerImpl {
    /// Create a new RPC server implementation wrapping the given node.
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl IncentraRpcServer for RpcServerImpl {
    async fn get_info(&self) -> Result<NodeInfoJson, ErrorObjectOwned> {
        Ok(NodeInfoJson {
            pool_address: self.node.pool_address().to_string(),
            native_denom: self.node.native_denom().to_string(),
            epoch_number: self.node.epoch_number().map_err(module_error)?,
            incentives: self.node.incentives().map_err(module_error)?.len(),
            params: self.node.params().map_err(module_error)?,
        })
    }

    async fn get_params(&self) -> Result<Params, ErrorObjectOwned> {
        self.node.params().map_err(module_error)
    }

    async fn set_params(&self, params: Params) -> Result<Params, ErrorObjectOwned> {
        self.node
            .set_params(params.clone())
            .map_err(module_error)?;
        Ok(params)
    }

    async fn get_incentive(&self, contract: String) -> Result<Incentive, ErrorObjectOwned> {
        let contract = parse_address(&contract)?;
        self.node.incentive(&contract).map_err(module_error)
    }

    async fn get_incentives(&self) -> Result<Vec<Incentive>, ErrorObjectOwned> {
        self.node.incentives().map_err(module_error)
    }

    async fn register_incentive(
        &self,
        contract: String,
        allocations: Vec<String>,
        epochs: u32,
    ) -> Result<Incentive, ErrorObjectOwned> {
        let contract = parse_address(&contract)?;
        let allocations = parse_allocations(&allocations)?;
        self.node
            .register_incentive(contract, allocations, epochs)
            .map_err(module_error)
    }

    async fn cancel_incentive(&self, contract: String) -> Result<Incentive, ErrorObjectOwned> {
        let contract = parse_address(&contract)?;
        self.node.cancel_incentive(&contract).map_err(module_error)
    }

    async fn report_usage(
        &self,
        contract: String,
        participant: String,
        delta: u64,
    ) -> Result<bool, ErrorObjectOwned> {
        let contract = parse_address(&contract)?;
        let participant = parse_address(&participant)?;
        self.node
            .report_usage(&contract, &participant, delta)
            .map_err(module_error)
    }

    async fn distribute(&self) -> Result<DistributionReport, ErrorObjectOwned> {
        self.node.distribute().map_err(module_error)
    }

    async fn end_epoch(&self, epoch_identifier: String) -> Result<EpochJson, ErrorObjectOwned> {
        let (epoch_number, distribution) = self
            .node
            .end_epoch(&epoch_identifier)
            .map_err(module_error)?;
        Ok(EpochJson {
            epoch_number,
            distribution,
        })
    }

    async fn get_usage_meter(
        &self,
        contract: String,
        participant: String,
    ) -> Result<Option<UsageMeter>, ErrorObjectOwned> {
        let contract = parse_address(&contract)?;
        let participant = parse_address(&participant)?;
        self.node
            .usage_meter(&contract, &participant)
            .map_err(module_error)
    }

    async fn get_usage_meters(&self, contract: String) -> Result<Vec<UsageMeter>, ErrorObjectOwned> {
        let contract = parse_address(&contract)?;
        self.node.usage_meters(&contract).map_err(module_error)
    }

    async fn get_allocation_meters(&self) -> Result<Vec<AllocationMeterJson>, ErrorObjectOwned> {
        Ok(self
            .node
            .allocation_meters()
            .map_err(module_error)?
            .into_iter()
            .map(|(denom, rate)| AllocationMeterJson {
                denom: denom.to_string(),
                rate,
            })
            .collect())
    }

    async fn get_allocation_meter(&self, denom: String) -> Result<Rate, ErrorObjectOwned> {
        let denom = parse_denom(&denom)?;
        self.node.allocation_meter(&denom).map_err(module_error)
    }

    async fn fund(
        &self,
        denom: String,
        amount: u64,
        account: Option<String>,
    ) -> Result<u64, ErrorObjectOwned> {
        let denom = parse_denom(&denom)?;
        let account = match account {
            Some(a) => parse_address(&a)?,
            None => self.node.pool_address(),
        };
        self.node
            .fund(&account, &denom, amount)
            .map_err(module_error)
    }

    async fn get_balance(&self, account: String, denom: String) -> Result<u64, ErrorObjectOwned> {
        let account = parse_address(&account)?;
        let denom = parse_denom(&denom)?;
        self.node.balance(&account, &denom).map_err(module_error)
    }

    async fn get_balances(&self, account: String) -> Result<Vec<BalanceJson>, ErrorObjectOwned> {
        let account = parse_address(&account)?;
        Ok(self
            .node
            .balances(&account)
            .map_err(module_error)?
            .into_iter()
            .map(|(denom, amount)| BalanceJson {
                denom: denom.to_string(),
                amount,
            })
            .collect())
    }

    async fn export_genesis(&self) -> Result<GenesisState, ErrorObjectOwned> {
        self.node.export_genesis().map_err(module_error)
    }
}

/// Start the JSON-RPC server on the given address.
///
/// Returns a [`ServerHandle`] that can be used to stop the server.
pub async fn start_rpc_server(addr: &str, node: Arc<Node>) -> Result<ServerHandle, NodeError> {
    let server = Server::builder()
        .build(addr)
        .await
        .map_err(|e| NodeError::Rpc(e.to_string()))?;

    let rpc_impl = RpcServerImpl::new(node);
    let handle = server.start(rpc_impl.into_rpc());

    Ok(handle)
}
