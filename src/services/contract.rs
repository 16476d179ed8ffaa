// src/services/contract.rs
//! Transaction requests built from a contract ABI.
//!
//! A call is rendered human-readable as `name(type arg, ...)` and sent to the
//! holder as a signed `ethtx` request; the holder's wallet encodes and
//! submits it.

use crate::error::{DidError, Result};
use crate::services::credentials::{Credentials, TxRequestParams};
use ethers::abi::{Abi, Function, ParamType, StateMutability};
use serde_json::{Map, Value};

/// Keys a caller-supplied transaction object may carry.
const TX_FIELDS: &[&str] = &["from", "to", "data", "value", "gasPrice", "gas"];

/// Request builder for one deployed contract.
pub struct ContractRequests<'a> {
    credentials: &'a Credentials,
    abi: Abi,
    address: String,
}

impl Credentials {
    /// Binds `abi` to the contract deployed at `address`.
    pub fn contract(&self, abi: Abi, address: &str) -> ContractRequests<'_> {
        ContractRequests {
            credentials: self,
            abi,
            address: address.to_string(),
        }
    }
}

/// Renders a call as `name(type arg, ...)`, quoting string arguments.
pub fn encode_method_readable(function: &Function, args: &[Value]) -> String {
    let rendered: Vec<String> = function
        .inputs
        .iter()
        .zip(args)
        .map(|(input, arg)| {
            let value = match (arg, &input.kind) {
                (Value::String(s), ParamType::String) => format!("\"{}\"", s),
                (Value::String(s), _) => s.clone(),
                (other, _) => other.to_string(),
            };
            format!("{} {}", input.kind, value)
        })
        .collect();
    format!("{}({})", function.name, rendered.join(", "))
}

impl<'a> ContractRequests<'a> {
    pub fn address(&self) -> &str {
        &self.address
    }

    fn function(&self, name: &str, arity: usize) -> Result<&Function> {
        if self.abi.events.contains_key(name) {
            return Err(DidError::InvalidRequestParams(format!(
                "{} is an event; events do not produce transactions",
                name
            )));
        }
        let overloads = self
            .abi
            .functions_by_name(name)
            .map_err(|_| DidError::InvalidRequestParams(format!("contract has no function {}", name)))?;
        let function = overloads
            .iter()
            .find(|f| f.inputs.len() == arity)
            .ok_or_else(|| {
                DidError::InvalidRequestParams(format!("{} does not take {} arguments", name, arity))
            })?;
        if matches!(function.state_mutability, StateMutability::View | StateMutability::Pure) {
            return Err(DidError::InvalidRequestParams(format!(
                "{} is a call; no transaction necessary",
                name
            )));
        }
        Ok(function)
    }

    /// Builds the transaction object for calling `name` with `args`.
    ///
    /// `tx` may add any of `from`, `to`, `data`, `value`, `gasPrice`, `gas`;
    /// `to` is always the bound contract address.
    pub fn transaction(&self, name: &str, args: &[Value], tx: Option<Map<String, Value>>) -> Result<Map<String, Value>> {
        let function = self.function(name, args.len())?;
        let mut tx = tx.unwrap_or_default();
        if let Some(key) = tx.keys().find(|key| !TX_FIELDS.contains(&key.as_str())) {
            return Err(DidError::InvalidRequestParams(format!("unknown transaction field {}", key)));
        }
        tx.insert("to".to_string(), self.address.clone().into());
        tx.insert("fn".to_string(), encode_method_readable(function, args).into());
        Ok(tx)
    }

    /// Signs a transaction request for calling `name` with `args`.
    pub fn request(
        &self,
        name: &str,
        args: &[Value],
        tx: Option<Map<String, Value>>,
        params: &TxRequestParams,
    ) -> Result<String> {
        let tx = self.transaction(name, args, tx)?;
        self.credentials.create_tx_request(tx, params)
    }
}
