//! The three binding-request probes of RFC 3489 Section 10.1.

use std::net::SocketAddr;

use crate::client::Client;
use crate::error::StunError;
use crate::message::{AT_CHANGED_ADDRESS, AT_MAPPED_ADDRESS, Attribute, Message};

/// Addresses learned from one binding response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BindingOutcome {
    /// Server-reflexive address (MAPPED-ADDRESS).
    pub mapped: SocketAddr,
    /// Server's alternate address (CHANGED-ADDRESS), when required.
    pub changed: SocketAddr,
}

/// Send one binding request to `dst`, with CHANGE-REQUEST flags when
/// either is set. `None` means no response before the schedule ran out.
async fn send_binding_request(
    client: &Client,
    dst: SocketAddr,
    change_ip: bool,
    change_port: bool,
) -> Result<Option<Message>, StunError> {
    let mut msg = Message::binding_request(client.new_transaction_id());
    if change_ip || change_port {
        msg.add_attribute(Attribute::change_request(change_ip, change_port));
    }
    client.send(&msg, dst).await
}

/// Extract a required address attribute from a response.
fn required_address(
    msg: &Message,
    attr_type: u16,
    name: &'static str,
) -> Result<SocketAddr, StunError> {
    let attribute = msg
        .attribute(attr_type)
        .ok_or(StunError::MissingAttribute(name))?;
    Ok(attribute.to_address()?.socket_addr())
}

/// Test I: plain binding request. The response must carry both
/// MAPPED-ADDRESS and CHANGED-ADDRESS.
pub(crate) async fn test1(
    client: &Client,
    dst: SocketAddr,
) -> Result<Option<BindingOutcome>, StunError> {
    tracing::debug!(%dst, "test I: binding request");
    let Some(response) = send_binding_request(client, dst, false, false).await? else {
        return Ok(None);
    };

    let changed = required_address(&response, AT_CHANGED_ADDRESS, "CHANGED-ADDRESS")?;
    let mapped = required_address(&response, AT_MAPPED_ADDRESS, "MAPPED-ADDRESS")?;
    Ok(Some(BindingOutcome { mapped, changed }))
}

/// Test II: binding request asking the server to reply from its
/// alternate IP and port.
pub(crate) async fn test2(
    client: &Client,
    dst: SocketAddr,
) -> Result<Option<SocketAddr>, StunError> {
    tracing::debug!(%dst, "test II: binding request with change-IP and change-port");
    let Some(response) = send_binding_request(client, dst, true, true).await? else {
        return Ok(None);
    };

    Ok(Some(required_address(
        &response,
        AT_MAPPED_ADDRESS,
        "MAPPED-ADDRESS",
    )?))
}

/// Test III: binding request asking the server to reply from its
/// alternate port only.
pub(crate) async fn test3(
    client: &Client,
    dst: SocketAddr,
) -> Result<Option<SocketAddr>, StunError> {
    tracing::debug!(%dst, "test III: binding request with change-port");
    let Some(response) = send_binding_request(client, dst, false, true).await? else {
        return Ok(None);
    };

    Ok(Some(required_address(
        &response,
        AT_MAPPED_ADDRESS,
        "MAPPED-ADDRESS",
    )?))
}
