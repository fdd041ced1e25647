// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inbound message dispatch.
//!
//! The [`TopicRouter`] takes one raw message from the transport, decodes its
//! topic and hands it to the right device handlers:
//!
//! ```text
//! MQTT message: server/data/temp/value → 72.5
//!                     ↓
//!             TopicRouter.route()
//!                     ↓
//!      decode → (server, data, temp, value)
//!                     ↓
//!     source = registry["server"] (or raw id)
//!                     ↓
//!   for every device d with d.did != "server":
//!        d.process_data("72.5", temp, value, source)
//! ```
//!
//! Commands go to the addressed device only. Status and data are fanned out
//! to every other device. A handler that fails or panics is logged and the
//! remaining devices still get the message.

use std::sync::Arc;

use crate::device::{DeviceHandle, DeviceRegistry, Source, isolate};
use crate::error::{DeviceError, TopicError};
use crate::types::Category;

use super::topic::TopicAddress;
use super::{ConnectionStatus, Publisher};

/// What happened to a routed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The topic could not be decoded; nothing was dispatched.
    Rejected(TopicError),
    /// The payload was empty; nothing was dispatched.
    EmptyPayload,
    /// The link is not connected; nothing was dispatched.
    NotConnected,
    /// A command for a device id not in the registry; silently dropped.
    Unaddressed,
    /// A command delivered to its device.
    Command {
        /// Whether the handler failed.
        failed: bool,
    },
    /// A status or data broadcast fanned out to other devices.
    Broadcast {
        /// Number of devices the message was delivered to.
        receivers: usize,
        /// Number of those whose handler failed.
        failures: usize,
    },
}

impl RouteOutcome {
    /// Returns true if at least one handler ran.
    #[must_use]
    pub fn was_dispatched(&self) -> bool {
        match self {
            Self::Command { .. } => true,
            Self::Broadcast { receivers, .. } => *receivers > 0,
            _ => false,
        }
    }
}

/// Dispatches inbound messages to registered devices.
///
/// The router runs synchronously on the transport's delivery path: a message
/// is fully dispatched before `route` returns, so messages are never
/// interleaved or reordered.
pub struct TopicRouter {
    registry: Arc<DeviceRegistry>,
    publisher: Arc<dyn Publisher>,
    status: ConnectionStatus,
}

impl TopicRouter {
    /// Creates a router over a registry.
    ///
    /// `status` is checked before every dispatch; `publisher` is passed on to
    /// device handlers.
    #[must_use]
    pub fn new(
        registry: Arc<DeviceRegistry>,
        publisher: Arc<dyn Publisher>,
        status: ConnectionStatus,
    ) -> Self {
        Self {
            registry,
            publisher,
            status,
        }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Returns the publisher handed to devices.
    #[must_use]
    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    /// Routes one inbound message.
    pub fn route(&self, topic: &str, payload: &str) -> RouteOutcome {
        if !self.status.is_connected() {
            tracing::warn!(topic = %topic, "Message received while not connected, dropping");
            return RouteOutcome::NotConnected;
        }

        let address = match TopicAddress::decode(topic) {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Malformed topic, dropping");
                return RouteOutcome::Rejected(e);
            }
        };

        if payload.is_empty() {
            tracing::warn!(topic = %topic, "Empty payload, dropping");
            return RouteOutcome::EmptyPayload;
        }

        tracing::debug!(topic = %topic, payload = %payload, "Routing message");
        match address.category {
            Category::Command => self.route_command(&address, payload),
            Category::Status | Category::Data => self.route_broadcast(&address, payload),
        }
    }

    fn route_command(&self, address: &TopicAddress, payload: &str) -> RouteOutcome {
        let Some(device) = self.registry.get(&address.did) else {
            tracing::trace!(did = %address.did, "Command for unknown device");
            return RouteOutcome::Unaddressed;
        };

        let result = isolate(|| {
            device.process_command(
                &self.publisher,
                payload,
                address.parameter.as_deref(),
                address.measure.as_deref(),
            )
        });
        let failed = report(device, address, result);
        RouteOutcome::Command { failed }
    }

    fn route_broadcast(&self, address: &TopicAddress, payload: &str) -> RouteOutcome {
        let source = match self.registry.get(&address.did) {
            Some(handle) => Source::Registered(handle),
            None => Source::Unregistered(&address.did),
        };
        let parameter = address.parameter.as_deref();
        let measure = address.measure.as_deref();

        let mut receivers = 0;
        let mut failures = 0;
        for device in self.registry.iter() {
            // A device never hears its own broadcasts.
            if device.did() == address.did {
                continue;
            }
            receivers += 1;
            let result = isolate(|| match address.category {
                Category::Status => {
                    device.process_status(&self.publisher, payload, parameter, measure, source)
                }
                _ => device.process_data(&self.publisher, payload, parameter, measure, source),
            });
            if report(device, address, result) {
                failures += 1;
            }
        }

        RouteOutcome::Broadcast {
            receivers,
            failures,
        }
    }
}

impl std::fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRouter")
            .field("devices", &self.registry.dids())
            .field("state", &self.status.get())
            .finish_non_exhaustive()
    }
}

/// Logs a handler failure. Returns true if the handler failed.
fn report(device: &DeviceHandle, address: &TopicAddress, result: Result<(), DeviceError>) -> bool {
    match result {
        Ok(()) => false,
        Err(e @ DeviceError::InvalidValue { .. }) => {
            tracing::warn!(did = %device.did(), topic = %address, error = %e, "Ignoring message");
            true
        }
        Err(e) => {
            tracing::error!(did = %device.did(), topic = %address, error = %e, "Handler failed");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceContext;
    use crate::protocol::ConnectionState;
    use crate::protocol::testing::RecordingPublisher;
    use parking_lot::Mutex;

    /// One handler invocation as seen by a device.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Call {
        handler: &'static str,
        value: String,
        parameter: Option<String>,
        measure: Option<String>,
        source: Option<String>,
    }

    type Log = Arc<Mutex<Vec<Call>>>;

    struct Spy {
        did: &'static str,
        log: Log,
        fail_with: Option<&'static str>,
    }

    impl Spy {
        fn record(
            &self,
            handler: &'static str,
            value: &str,
            parameter: Option<&str>,
            measure: Option<&str>,
            source: Option<&str>,
        ) -> Result<(), DeviceError> {
            self.log.lock().push(Call {
                handler,
                value: value.to_string(),
                parameter: parameter.map(str::to_string),
                measure: measure.map(str::to_string),
                source: source.map(str::to_string),
            });
            match self.fail_with {
                Some("panic") => panic!("{} exploded", self.did),
                Some(parameter) => Err(DeviceError::InvalidValue {
                    parameter: parameter.to_string(),
                    value: value.to_string(),
                }),
                None => Ok(()),
            }
        }
    }

    impl crate::device::Device for Spy {
        fn did(&self) -> &str {
            self.did
        }

        fn process_own_command(
            &mut self,
            _ctx: &mut DeviceContext<'_>,
            value: &str,
            parameter: Option<&str>,
            measure: Option<&str>,
        ) -> Result<(), DeviceError> {
            self.record("command", value, parameter, measure, None)
        }

        fn process_status(
            &mut self,
            _ctx: &mut DeviceContext<'_>,
            value: &str,
            parameter: Option<&str>,
            measure: Option<&str>,
            source: Source<'_>,
        ) -> Result<(), DeviceError> {
            self.record("status", value, parameter, measure, Some(source.did()))
        }

        fn process_data(
            &mut self,
            _ctx: &mut DeviceContext<'_>,
            value: &str,
            parameter: Option<&str>,
            measure: Option<&str>,
            source: Source<'_>,
        ) -> Result<(), DeviceError> {
            self.record("data", value, parameter, measure, Some(source.did()))
        }

        fn publish_status(&mut self, _ctx: &mut DeviceContext<'_>) {}
    }

    struct Fixture {
        router: TopicRouter,
        logs: Vec<(&'static str, Log)>,
        status: ConnectionStatus,
    }

    impl Fixture {
        fn new(devices: &[(&'static str, Option<&'static str>)]) -> Self {
            let mut registry = DeviceRegistry::new();
            let mut logs = Vec::new();
            for &(did, fail_with) in devices {
                let log = Log::default();
                registry
                    .register(Box::new(Spy {
                        did,
                        log: Arc::clone(&log),
                        fail_with,
                    }))
                    .unwrap();
                logs.push((did, log));
            }
            let status = ConnectionStatus::new(ConnectionState::Connected);
            let router = TopicRouter::new(
                Arc::new(registry),
                Arc::new(RecordingPublisher::default()),
                status.clone(),
            );
            Self {
                router,
                logs,
                status,
            }
        }

        fn calls(&self, did: &str) -> Vec<Call> {
            self.logs
                .iter()
                .find(|(name, _)| *name == did)
                .map(|(_, log)| log.lock().clone())
                .unwrap_or_default()
        }

        fn total_calls(&self) -> usize {
            self.logs.iter().map(|(_, log)| log.lock().len()).sum()
        }
    }

    fn three_devices() -> Fixture {
        Fixture::new(&[("server", None), ("sfan", None), ("thingspeak", None)])
    }

    #[test]
    fn command_reaches_only_the_addressed_device() {
        let fixture = three_devices();
        let outcome = fixture.router.route("sfan/command/percon", "80");

        assert_eq!(outcome, RouteOutcome::Command { failed: false });
        let calls = fixture.calls("sfan");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].handler, "command");
        assert_eq!(calls[0].value, "80");
        assert_eq!(calls[0].parameter.as_deref(), Some("percon"));
        assert!(calls[0].measure.is_none());
        assert_eq!(fixture.total_calls(), 1);
    }

    #[test]
    fn command_for_unknown_device_is_dropped() {
        let fixture = three_devices();
        assert_eq!(
            fixture.router.route("blynk/command", "status"),
            RouteOutcome::Unaddressed
        );
        assert_eq!(fixture.total_calls(), 0);
    }

    #[test]
    fn broadcast_excludes_the_source() {
        let fixture = three_devices();
        let outcome = fixture.router.route("server/data/temp/value", "72.5");

        assert_eq!(
            outcome,
            RouteOutcome::Broadcast {
                receivers: 2,
                failures: 0
            }
        );
        assert!(fixture.calls("server").is_empty());
        for did in ["sfan", "thingspeak"] {
            let calls = fixture.calls(did);
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].handler, "data");
            assert_eq!(calls[0].value, "72.5");
            assert_eq!(calls[0].parameter.as_deref(), Some("temp"));
            assert_eq!(calls[0].measure.as_deref(), Some("value"));
            assert_eq!(calls[0].source.as_deref(), Some("server"));
        }
    }

    #[test]
    fn status_goes_to_status_handler() {
        let fixture = three_devices();
        fixture.router.route("sfan/status/run", "active");

        assert!(fixture.calls("sfan").is_empty());
        let calls = fixture.calls("thingspeak");
        assert_eq!(calls[0].handler, "status");
        assert_eq!(calls[0].parameter.as_deref(), Some("run"));
        assert!(calls[0].measure.is_none());
    }

    #[test]
    fn broadcast_from_unregistered_source_reaches_everyone() {
        let fixture = three_devices();
        let outcome = fixture.router.route("weather/data/temp/value", "12.0");

        assert_eq!(
            outcome,
            RouteOutcome::Broadcast {
                receivers: 3,
                failures: 0
            }
        );
        assert_eq!(fixture.calls("server")[0].source.as_deref(), Some("weather"));
    }

    #[test]
    fn malformed_topic_dispatches_nothing() {
        let fixture = three_devices();
        let outcome = fixture.router.route("server/data/temp/value/extra", "72.5");

        assert_eq!(outcome, RouteOutcome::Rejected(TopicError::TooManySegments(5)));
        assert!(!outcome.was_dispatched());
        assert_eq!(fixture.total_calls(), 0);
    }

    #[test]
    fn unknown_category_dispatches_nothing() {
        let fixture = three_devices();
        let outcome = fixture.router.route("server/telemetry/temp", "1");
        assert!(matches!(outcome, RouteOutcome::Rejected(TopicError::UnknownCategory(_))));
        assert_eq!(fixture.total_calls(), 0);
    }

    #[test]
    fn empty_payload_dispatches_nothing() {
        let fixture = three_devices();
        assert_eq!(
            fixture.router.route("sfan/command", ""),
            RouteOutcome::EmptyPayload
        );
        assert_eq!(fixture.total_calls(), 0);
    }

    #[test]
    fn nothing_is_dispatched_while_disconnected() {
        let fixture = three_devices();
        fixture.status.set(ConnectionState::Connecting);

        assert_eq!(
            fixture.router.route("sfan/command", "status"),
            RouteOutcome::NotConnected
        );
        assert_eq!(fixture.total_calls(), 0);
    }

    #[test]
    fn failing_handler_does_not_stop_fan_out() {
        let fixture = Fixture::new(&[
            ("server", None),
            ("broken", Some("panic")),
            ("picky", Some("temp")),
            ("sfan", None),
        ]);

        let outcome = fixture.router.route("server/data/temp/value", "72.5");

        assert_eq!(
            outcome,
            RouteOutcome::Broadcast {
                receivers: 3,
                failures: 2
            }
        );
        assert_eq!(fixture.calls("sfan").len(), 1);

        // The panicking device is still usable afterwards.
        fixture.router.route("server/data/temp/value", "73.0");
        assert_eq!(fixture.calls("broken").len(), 2);
    }

    #[test]
    fn command_failure_is_reported() {
        let fixture = Fixture::new(&[("broken", Some("panic"))]);
        assert_eq!(
            fixture.router.route("broken/command/level", "1"),
            RouteOutcome::Command { failed: true }
        );
    }
}
