//! In-memory link used by simulated vehicles and tests.
//!
//! The [`LoopbackHandle`] is the far end of the link: it injects inbound
//! messages (or undecodable frames), records everything the gateway sent,
//! and can install responders that answer outbound messages synchronously.

use super::{LinkConnection, LinkConnector};
use crate::endpoint::LinkEndpoint;
use crate::errors::LinkError;
use crate::message::{msg_ids, msg_types, LinkMessage, LinkTarget};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

type Responder = Box<dyn FnMut(&LinkMessage) -> Vec<LinkMessage> + Send>;

#[derive(Default)]
struct LoopbackState {
    inbound: VecDeque<Result<LinkMessage, LinkError>>,
    outbound: Vec<LinkMessage>,
    responders: Vec<Responder>,
    fail_sends: bool,
    connects: usize,
    closes: usize,
}

/// Far end of a loopback link. Cloning shares the same link.
#[derive(Clone, Default)]
pub struct LoopbackHandle {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for the gateway to receive.
    pub fn inject(&self, message: LinkMessage) {
        self.state.lock().inbound.push_back(Ok(message));
    }

    /// Queue a frame that fails to decode on the gateway side.
    pub fn inject_malformed(&self, reason: &str) {
        self.state
            .lock()
            .inbound
            .push_back(Err(LinkError::Codec(reason.to_string())));
    }

    /// Queue a heartbeat from `source`.
    pub fn inject_heartbeat(&self, source: LinkTarget) {
        self.inject(heartbeat(source));
    }

    /// Everything the gateway has sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<LinkMessage> {
        self.state.lock().outbound.clone()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.state.lock().outbound.len()
    }

    pub fn clear_sent(&self) {
        self.state.lock().outbound.clear();
    }

    #[must_use]
    pub fn pending_inbound(&self) -> usize {
        self.state.lock().inbound.len()
    }

    /// Install a responder. Every message the gateway sends is passed to
    /// each responder and the replies are queued as inbound traffic.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: FnMut(&LinkMessage) -> Vec<LinkMessage> + Send + 'static,
    {
        self.state.lock().responders.push(Box::new(responder));
    }

    /// Make subsequent sends fail with an I/O error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Number of connections opened through any connector of this handle.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            handle: self.clone(),
        }
    }

    /// Open a connection directly, bypassing the connector.
    pub fn open(&self, endpoint: LinkEndpoint) -> LoopbackLink {
        self.state.lock().connects += 1;
        LoopbackLink {
            handle: self.clone(),
            endpoint,
            closed: false,
        }
    }
}

/// Heartbeat frame as a vehicle would emit it.
pub fn heartbeat(source: LinkTarget) -> LinkMessage {
    LinkMessage::new(msg_ids::HEARTBEAT, msg_types::HEARTBEAT)
        .with_source(source)
        .with_field("type", 2)
        .with_field("autopilot", 12)
        .with_field("base_mode", 0)
        .with_field("custom_mode", 0)
        .with_field("system_status", 4)
        .with_field("mavlink_version", 3)
}

/// Connector that always opens a link to the same [`LoopbackHandle`].
#[derive(Clone)]
pub struct LoopbackConnector {
    handle: LoopbackHandle,
}

impl LinkConnector for LoopbackConnector {
    fn connect(&self, endpoint: &LinkEndpoint) -> Result<Box<dyn LinkConnection>, LinkError> {
        Ok(Box::new(self.handle.open(endpoint.clone())))
    }
}

/// Gateway end of a loopback link.
pub struct LoopbackLink {
    handle: LoopbackHandle,
    endpoint: LinkEndpoint,
    closed: bool,
}

impl LinkConnection for LoopbackLink {
    fn try_recv(&mut self) -> Result<Option<LinkMessage>, LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        match self.handle.state.lock().inbound.pop_front() {
            Some(frame) => frame.map(|message| Some(message.captured_now())),
            None => Ok(None),
        }
    }

    fn send(&mut self, message: &LinkMessage) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        let mut guard = self.handle.state.lock();
        let state = &mut *guard;
        if state.fail_sends {
            return Err(LinkError::Io("simulated send failure".into()));
        }
        state.outbound.push(message.clone());
        for responder in state.responders.iter_mut() {
            let replies = responder(message);
            state.inbound.extend(replies.into_iter().map(Ok));
        }
        Ok(())
    }

    fn endpoint(&self) -> &LinkEndpoint {
        &self.endpoint
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.handle.state.lock().closes += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn link(handle: &LoopbackHandle) -> Box<dyn LinkConnection> {
        handle.connector().connect(&LinkEndpoint::sim("test")).unwrap()
    }

    #[test]
    fn test_inject_and_receive() {
        let handle = LoopbackHandle::new();
        let mut conn = link(&handle);
        handle.inject(LinkMessage::new(30, "ATTITUDE"));
        let msg = conn.try_recv().unwrap().unwrap();
        assert_eq!(msg.msg_type, "ATTITUDE");
        assert!(msg.captured_at.is_some());
        assert!(conn.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_responder_replies_are_inbound() {
        let handle = LoopbackHandle::new();
        handle.respond_with(|msg| {
            if msg.msg_type == "PING" {
                vec![LinkMessage::new(1, "PONG")]
            } else {
                Vec::new()
            }
        });
        let mut conn = link(&handle);
        conn.send(&LinkMessage::new(4, "PING")).unwrap();
        assert_eq!(handle.sent_count(), 1);
        assert_eq!(conn.try_recv().unwrap().unwrap().msg_type, "PONG");
    }

    #[test]
    fn test_wait_heartbeat_skips_other_traffic() {
        let handle = LoopbackHandle::new();
        let mut conn = link(&handle);
        handle.inject(LinkMessage::new(30, "ATTITUDE"));
        handle.inject_heartbeat(LinkTarget::new(3, 1));
        let hb = conn
            .wait_heartbeat(Duration::from_millis(100))
            .unwrap()
            .unwrap();
        assert_eq!(hb.source.system_id, 3);
    }

    #[test]
    fn test_wait_heartbeat_times_out() {
        let handle = LoopbackHandle::new();
        let mut conn = link(&handle);
        let got = conn.wait_heartbeat(Duration::from_millis(20)).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn test_closed_link_rejects_io() {
        let handle = LoopbackHandle::new();
        let mut conn = link(&handle);
        conn.close();
        conn.close();
        assert_eq!(handle.close_count(), 1);
        assert_eq!(conn.try_recv().unwrap_err(), LinkError::Closed);
        assert_eq!(
            conn.send(&LinkMessage::new(0, "HEARTBEAT")).unwrap_err(),
            LinkError::Closed
        );
    }

    #[test]
    fn test_failing_sends() {
        let handle = LoopbackHandle::new();
        let mut conn = link(&handle);
        handle.set_fail_sends(true);
        assert!(matches!(
            conn.send(&LinkMessage::new(0, "HEARTBEAT")),
            Err(LinkError::Io(_))
        ));
        assert_eq!(handle.sent_count(), 0);
    }

    #[test]
    fn test_malformed_frame_surfaces_as_codec_error() {
        let handle = LoopbackHandle::new();
        let mut conn = link(&handle);
        handle.inject_malformed("bad crc");
        handle.inject(LinkMessage::new(30, "ATTITUDE"));
        assert_eq!(
            conn.try_recv().unwrap_err(),
            LinkError::Codec("bad crc".into())
        );
        assert_eq!(conn.try_recv().unwrap().unwrap().msg_type, "ATTITUDE");
    }

    #[test]
    fn test_wait_heartbeat_skips_malformed_frames() {
        let handle = LoopbackHandle::new();
        let mut conn = link(&handle);
        handle.inject_malformed("bad crc");
        handle.inject_malformed("short read");
        handle.inject_heartbeat(LinkTarget::new(5, 1));
        let hb = conn
            .wait_heartbeat(Duration::from_millis(100))
            .unwrap()
            .unwrap();
        assert_eq!(hb.source.system_id, 5);
    }
}
