//! Client control messages: subscribe and unsubscribe requests.
//!
//! ```text
//! {"op": "block"}                       {"op": "rm_block"}
//! {"op": "transaction"}                 {"op": "rm_transaction"}
//! {"op": "address", "address": "..."}   {"op": "rm_address", "address": "..."}
//! {"op": "opreturn", "prefix": "hex"}   {"op": "rm_opreturn", "prefix": "hex"}
//! ```
//!
//! Every request gets exactly one reply on the same connection. Invalid
//! requests get an `error` reply and leave the connection open.

use bchsock_chain::{cashaddr, AddressError};
use bchsock_websocket::Connection;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::messages::{ErrorReply, Reply};
use crate::metrics;
use crate::registry::SubscriptionRegistry;
use crate::subscription::{OpReturnPrefix, Subscription, MAX_OPRETURN_PREFIX};

const MAX_PREFIX_HEX_LEN: usize = MAX_OPRETURN_PREFIX * 2;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Unable to parse JSON request. {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Error while parsing JSON request. Expected Object, but encountered {0}")]
    NotObject(&'static str),
    #[error("Error while parsing JSON request. Expected 'op' parameter as string.")]
    MissingOp,
    #[error("Error while parsing JSON request. Expected valid 'op' parameter.")]
    UnknownOp,
    #[error("Error while parsing JSON request. Expected 'address' parameter as string.")]
    MissingAddress,
    #[error("Unable to decode cash address. {0}")]
    Address(#[from] AddressError),
    #[error("Error while parsing JSON request. Expected 'prefix' parameter as string.")]
    MissingPrefix,
    #[error("Error while parsing JSON request. Expected 'prefix' parameter to be valid hex.")]
    InvalidHex,
    #[error("Error while parsing JSON request. Expected 'prefix' parameter to be less than 32 hex characters long.")]
    PrefixTooLong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, PartialEq, Eq)]
struct Command {
    op: &'static str,
    action: Action,
    subscription: Subscription,
}

/// Apply one control message from `conn` and send the reply.
pub fn handle_message(
    conn: &Connection,
    text: &str,
    registry: &SubscriptionRegistry,
    address_prefix: &str,
) {
    let command = match parse_command(text, address_prefix) {
        Ok(command) => command,
        Err(e) => {
            metrics::inc_control_message("error");
            debug!(conn_id = conn.id(), error = %e, "rejected control message");
            send_reply(conn, &ErrorReply::new(&e.to_string()));
            return;
        }
    };

    metrics::inc_control_message(command.op);
    let succeeded = match command.action {
        Action::Subscribe => registry.add_subscription(conn, command.subscription),
        Action::Unsubscribe => registry.remove_subscription(conn, &command.subscription),
    };
    info!(conn_id = conn.id(), op = command.op, succeeded, "control message");

    let reply = match command.action {
        Action::Subscribe => Reply::ok(command.op),
        Action::Unsubscribe => Reply::from_outcome(command.op, succeeded),
    };
    send_reply(conn, &reply);
}

fn send_reply<T: Serialize>(conn: &Connection, reply: &T) {
    let text = match serde_json::to_string(reply) {
        Ok(text) => text,
        Err(e) => {
            debug!(conn_id = conn.id(), error = %e, "failed to serialize reply");
            return;
        }
    };
    if let Err(e) = conn.send_text(&text) {
        debug!(conn_id = conn.id(), error = %e, "failed to send reply");
    }
}

fn parse_command(text: &str, address_prefix: &str) -> Result<Command, ControlError> {
    let value: Value = serde_json::from_str(text.trim())?;
    let object = match value {
        Value::Object(object) => object,
        other => return Err(ControlError::NotObject(json_type(&other))),
    };
    let op = object
        .get("op")
        .and_then(Value::as_str)
        .ok_or(ControlError::MissingOp)?
        .to_ascii_lowercase();

    let (op, action) = match op.as_str() {
        "block" => ("block", Action::Subscribe),
        "rm_block" => ("rm_block", Action::Unsubscribe),
        "transaction" => ("transaction", Action::Subscribe),
        "rm_transaction" => ("rm_transaction", Action::Unsubscribe),
        "address" => ("address", Action::Subscribe),
        "rm_address" => ("rm_address", Action::Unsubscribe),
        "opreturn" => ("opreturn", Action::Subscribe),
        "rm_opreturn" => ("rm_opreturn", Action::Unsubscribe),
        _ => return Err(ControlError::UnknownOp),
    };

    let subscription = match op.trim_start_matches("rm_") {
        "block" => Subscription::Block,
        "transaction" => Subscription::Transaction,
        "address" => parse_address(&object, address_prefix)?,
        _ => parse_opreturn(&object)?,
    };

    Ok(Command {
        op,
        action,
        subscription,
    })
}

fn parse_address(object: &Map<String, Value>, default_prefix: &str) -> Result<Subscription, ControlError> {
    let text = object
        .get("address")
        .and_then(Value::as_str)
        .ok_or(ControlError::MissingAddress)?;
    Ok(Subscription::Address(cashaddr::decode(text, default_prefix)?))
}

fn parse_opreturn(object: &Map<String, Value>) -> Result<Subscription, ControlError> {
    let text = object
        .get("prefix")
        .and_then(Value::as_str)
        .ok_or(ControlError::MissingPrefix)?;
    if !text.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ControlError::InvalidHex);
    }
    if text.len() > MAX_PREFIX_HEX_LEN {
        return Err(ControlError::PrefixTooLong);
    }
    let bytes = hex::decode(text).map_err(|_| ControlError::InvalidHex)?;
    let prefix = OpReturnPrefix::new(&bytes).ok_or(ControlError::PrefixTooLong)?;
    Ok(Subscription::OpReturn(prefix))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Boolean",
        Value::Number(n) if n.is_f64() => "Float",
        Value::Number(_) => "Integer",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}
