//! Server lifecycle against real OS processes.
//!
//! Servers are `sleep` processes spawned by [`LocalProcessController`];
//! liveness comes from the system process table.
//!
//! [`LocalProcessController`]: crate::controller::LocalProcessController

#[cfg(all(test, unix))]
mod tests {
    use std::time::{Duration, Instant};

    use cluster_server::ServerError;
    use cluster_types::{ServerState, ServerSymbolicName};
    use serial_test::serial;

    use crate::harness::ClusterHarness;
    use crate::init_tracing;

    fn name(s: &str) -> ServerSymbolicName {
        ServerSymbolicName::new(s).unwrap()
    }

    /// Start a two-server stripe, crash the passive, stop the active.
    #[test]
    #[serial]
    fn crash_is_reported_instead_of_waiting() {
        init_tracing();
        let harness = ClusterHarness::new().unwrap();
        let topology = harness.topology(&[2], true).unwrap();

        let mut active = harness.instance("stripe0-server0", &topology).unwrap();
        let mut passive = harness.instance("stripe0-server1", &topology).unwrap();
        assert_eq!(active.state(), ServerState::Stopped);

        assert_eq!(active.start().unwrap(), ServerState::StartedAsActive);
        assert_eq!(passive.start().unwrap(), ServerState::StartedAsPassive);

        // The controller launched each server with its relay ports
        for instance in [&active, &passive] {
            let launched = harness
                .controller()
                .proxied_ports(instance.server().symbolic_name())
                .unwrap();
            assert_eq!(&launched, instance.proxied_ports());
            assert_eq!(launched.len(), 1);
        }

        // A live server cannot be created twice
        assert!(matches!(
            passive.create(),
            Err(ServerError::AlreadyRunning(_))
        ));

        harness.controller().kill_all(&name("stripe0-server1"));

        // Nobody publishes STOPPED; the dead processes end the wait
        let started = Instant::now();
        match passive.wait_for_state(|s| s == ServerState::Stopped) {
            Err(ServerError::ProcessDied { server, last_state }) => {
                assert_eq!(server, name("stripe0-server1"));
                assert_eq!(last_state, ServerState::StartedAsPassive);
            }
            other => panic!("expected process death, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!passive.handle().unwrap().is_alive());

        assert!(active.handle().unwrap().is_alive());
        active.stop().unwrap();
        assert_eq!(active.state(), ServerState::Stopped);
        assert!(active.handle().is_none());
        // Stopping again is a no-op
        active.stop().unwrap();

        // A crashed server can be created again
        assert_eq!(passive.start().unwrap(), ServerState::StartedAsPassive);
        passive.stop().unwrap();

        active.close();
        passive.close();
        assert!(harness.context().provider.links().is_empty());
    }

    /// Waiting on an instance that never had a process.
    #[test]
    #[serial]
    fn wait_without_process() {
        init_tracing();
        let harness = ClusterHarness::new().unwrap();
        let topology = harness.topology(&[1, 1], false).unwrap();
        let instance = harness.instance("stripe1-server0", &topology).unwrap();

        assert_eq!(
            instance.wait_for_state(|s| s == ServerState::Stopped).unwrap(),
            ServerState::Stopped
        );
        assert!(matches!(
            instance.wait_for_state(|s| s.is_started()),
            Err(ServerError::NotCreated(_))
        ));
        assert!(matches!(
            instance.disrupt(&[name("stripe0-server0")]),
            Err(ServerError::DisruptionNotEnabled(_))
        ));
    }
}
