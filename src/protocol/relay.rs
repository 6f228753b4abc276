//! In-process federation host: runs the platform's delivery rule over a set
//! of site mailboxes. A participant's outgoing payload goes to the
//! coordinator; a coordinator's outgoing payload is broadcast to every
//! participant. Transport-level concerns stop here; the drivers only ever
//! see their own mailbox.

use std::time::Duration;

use tracing::{debug, warn};

use crate::protocol::mailbox::Mailbox;

const RELAY_NAP: Duration = Duration::from_millis(10);

/// Shuttles payloads between the sites until every driver has finished.
/// When any site fails, the remaining sites are cancelled so the federation
/// never hangs on a dead peer.
pub fn run_relay(coordinator: &Mailbox, participants: &[Mailbox]) {
    let sites: Vec<&Mailbox> = std::iter::once(coordinator)
        .chain(participants.iter())
        .collect();

    loop {
        let mut moved = false;

        while let Some(bytes) = coordinator.handle_outgoing() {
            debug!(
                bytes = bytes.len(),
                recipients = participants.len(),
                "broadcasting coordinator payload"
            );
            for participant in participants {
                participant.handle_incoming(bytes.clone());
            }
            moved = true;
        }
        for participant in participants {
            while let Some(bytes) = participant.handle_outgoing() {
                debug!(bytes = bytes.len(), "relaying participant payload");
                coordinator.handle_incoming(bytes);
                moved = true;
            }
        }

        if sites.iter().any(|m| m.has_failed()) {
            for mailbox in &sites {
                if !mailbox.is_finished() {
                    mailbox.cancel();
                }
            }
        }
        if sites.iter().all(|m| m.is_finished()) {
            break;
        }

        if !moved {
            std::thread::sleep(RELAY_NAP);
        }
    }

    if sites.iter().any(|m| m.is_cancelled()) {
        warn!("federation aborted; remaining sites were cancelled");
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/protocol/relay.rs"]
mod tests;
