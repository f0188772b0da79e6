//! The packet router: one inbound frame in, at most one handler invoked.

use wirelink_protocol::{Codec, decode_frame};

use crate::SessionError;
use crate::calls::CallRegistry;
use crate::registry::Dispatched;

/// What happened to an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// The frame decoded and a handler ran.
    Dispatched(Dispatched),
    /// The frame did not decode and was dropped.
    Dropped,
}

/// Decodes `data` and dispatches the envelope through `calls`.
///
/// Malformed frames are dropped (see
/// [`on_decode_failure`](wirelink_protocol::on_decode_failure)) and are
/// `Ok(Routed::Dropped)`, never an error.
///
/// # Errors
/// Returns [`SessionError::NoHandler`] for a well-formed envelope nobody
/// is registered for. The caller reports it; the session stays up.
pub fn route_frame(
    codec: &impl Codec,
    calls: &mut CallRegistry,
    data: &[u8],
) -> Result<Routed, SessionError> {
    let Some(envelope) = decode_frame(codec, data) else {
        return Ok(Routed::Dropped);
    };
    tracing::debug!(kind = %envelope.kind, key = envelope.route_key(), "routing envelope");
    calls.dispatch(envelope).map(Routed::Dispatched)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use wirelink_protocol::{Envelope, JsonCodec, Kind};

    use super::*;

    #[test]
    fn test_route_frame_callback_settles_pending_call() {
        let mut calls = CallRegistry::new("s");
        let got = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&got);
        let id = calls.allocate_call(move |env| *sink.lock().unwrap() = Some(env));

        let frame = format!(r#"{{"t":"callback","i":"{id}","d":{{"status":200}}}}"#);
        let routed = route_frame(&JsonCodec, &mut calls, frame.as_bytes()).unwrap();

        assert_eq!(routed, Routed::Dispatched(Dispatched::OneShot));
        assert_eq!(got.lock().unwrap().as_ref().unwrap().correlation_id, id);
    }

    #[test]
    fn test_route_frame_malformed_is_dropped_without_touching_pending_calls() {
        let mut calls = CallRegistry::new("s");
        calls.allocate_call(|_| panic!("must stay pending"));

        let frames: [&[u8]; 4] = [
            b"{not json",
            b"",
            br#"{"t":"callback"}"#,
            br#"{"t":"x","i":"s-1"}"#,
        ];
        for garbage in frames {
            let routed = route_frame(&JsonCodec, &mut calls, garbage).unwrap();
            assert_eq!(routed, Routed::Dropped);
        }
        assert_eq!(calls.pending(), 1);
    }

    #[test]
    fn test_route_frame_unregistered_method_is_routing_error() {
        let mut calls = CallRegistry::new("s");

        let result = route_frame(&JsonCodec, &mut calls, br#"{"t":"call","n":"ping","i":"x"}"#);

        assert!(matches!(
            result,
            Err(SessionError::NoHandler { kind: Kind::Call, ref name }) if name == "ping"
        ));
    }

    #[test]
    fn test_route_frame_registered_method_receives_envelope() {
        let mut calls = CallRegistry::new("s");
        let got = Arc::new(Mutex::new(Vec::<Envelope>::new()));
        let sink = Arc::clone(&got);
        calls.register("ping", Kind::Call, Arc::new(move |env| sink.lock().unwrap().push(env)));

        let routed =
            route_frame(&JsonCodec, &mut calls, br#"{"t":"call","n":"ping","i":"x"}"#).unwrap();

        assert_eq!(routed, Routed::Dispatched(Dispatched::Durable));
        let got = got.lock().unwrap();
        assert_eq!(got[0].action, "ping");
        assert_eq!(got[0].correlation_id, "x");
    }
}
