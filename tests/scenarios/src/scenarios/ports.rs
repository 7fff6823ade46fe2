//! Port reservation races.
//!
//! Threads, independent choosers and a second OS process compete for ports.
//! An independent "currently held" set catches any port granted twice. The
//! second process is this test binary re-executed with a marker variable.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::{BufRead, BufReader, Write};
    use std::net::{IpAddr, Ipv4Addr, TcpListener};
    use std::process::{Command, Stdio};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use cluster_ports::{InProcessPortLocker, LockingPortChooser, PortConfig, PortError};
    use rand::Rng;
    use serial_test::serial;

    use crate::assertions::assert_disjoint_reservations;
    use crate::harness::ClusterHarness;
    use crate::init_tracing;

    const THREADS: usize = 5;
    const RUN_FOR: Duration = Duration::from_secs(2);

    /// Five threads loop reserve(1), use, close for two seconds; no port is
    /// ever held by two of them at once.
    #[test]
    fn concurrent_single_port_reservations_never_collide() {
        init_tracing();
        let harness = ClusterHarness::new().unwrap();
        let chooser = Arc::clone(&harness.context().ports);

        let held: Arc<Mutex<HashSet<u16>>> = Arc::new(Mutex::new(HashSet::new()));
        let collisions = Arc::new(AtomicUsize::new(0));
        let cycles = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let chooser = Arc::clone(&chooser);
                let held = Arc::clone(&held);
                let collisions = Arc::clone(&collisions);
                let cycles = Arc::clone(&cycles);
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    let start = Instant::now();
                    while start.elapsed() < RUN_FOR {
                        let lock = chooser.reserve(1).unwrap();
                        let port = lock.base();
                        if !held.lock().unwrap().insert(port) {
                            collisions.fetch_add(1, Ordering::SeqCst);
                        }

                        // Use it: the port must actually be bindable
                        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port));
                        std::thread::sleep(Duration::from_micros(rng.gen_range(0..2_000)));
                        drop(listener);

                        held.lock().unwrap().remove(&port);
                        lock.close().unwrap();
                        cycles.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        tracing::info!(
            "{} reserve/close cycles across {} threads",
            cycles.load(Ordering::SeqCst),
            THREADS
        );
        assert_eq!(collisions.load(Ordering::SeqCst), 0);
        assert!(cycles.load(Ordering::SeqCst) >= THREADS);
        assert!(held.lock().unwrap().is_empty());
    }

    /// Blocks held at the same time never overlap.
    #[test]
    fn simultaneous_blocks_are_disjoint() {
        init_tracing();
        let harness = ClusterHarness::new().unwrap();
        let mut rng = rand::thread_rng();

        let locks: Vec<_> = (0..16)
            .map(|_| {
                let count = rng.gen_range(1..=6);
                harness.context().ports.reserve(count).unwrap()
            })
            .collect();
        let blocks: Vec<Vec<u16>> = locks.iter().map(|l| l.ports().collect()).collect();

        let result = assert_disjoint_reservations(&blocks);
        assert!(result.passed, "{:?}", result.failure_details);

        for lock in locks {
            lock.close().unwrap();
        }
    }

    /// A second chooser sharing the lock file cannot take ports the first
    /// one holds, and can once they are released.
    #[cfg(target_os = "linux")]
    #[test]
    fn lock_file_excludes_second_chooser() {
        init_tracing();
        let harness = ClusterHarness::new().unwrap();
        let held = harness.context().ports.reserve(4).unwrap();

        // Only the held block is eligible for the second chooser
        let config = PortConfig {
            lock_file: harness.config().ports.lock_file.clone(),
            probe_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            min_port: held.base(),
            max_port: held.base() + 3,
        };
        // A private in-process set leaves the lock file as the only arbiter
        let rival = LockingPortChooser::from_config_with(&config, InProcessPortLocker::new()).unwrap();

        match rival.reserve_with_limit(1, 50) {
            Err(PortError::Exhausted { count, attempts }) => {
                assert_eq!(count, 1);
                assert_eq!(attempts, 50);
            }
            other => panic!("expected exhaustion, got {:?}", other.map(|l| l.base())),
        }

        held.close().unwrap();
        let taken = rival.reserve_with_limit(1, 1_000).unwrap();
        assert!((config.min_port..=config.max_port).contains(&taken.base()));
        taken.close().unwrap();
    }

    // ========================================================================
    // Cross-process exclusion
    // ========================================================================

    /// Set in the re-executed test binary: lock file to hold a block in.
    const HOLDER_LOCK_FILE: &str = "CLUSTERKIT_HOLDER_LOCK_FILE";

    /// Child side: hold four ports, announce them, and block until killed.
    fn hold_block_until_killed(lock_file: String) {
        let config = PortConfig {
            lock_file: lock_file.into(),
            probe_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..PortConfig::default()
        };
        let chooser = LockingPortChooser::from_config(&config).unwrap();
        let held = chooser.reserve(4).unwrap();
        println!("HELD {}", held.base());
        std::io::stdout().flush().unwrap();

        // stdin is a pipe the parent never writes to
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        held.close().unwrap();
    }

    /// Ports held by another OS process are refused until that process dies.
    #[cfg(unix)]
    #[test]
    #[serial]
    fn lock_file_excludes_other_process() {
        if let Ok(lock_file) = std::env::var(HOLDER_LOCK_FILE) {
            hold_block_until_killed(lock_file);
            return;
        }
        init_tracing();
        let harness = ClusterHarness::new().unwrap();
        let lock_file = harness.config().ports.lock_file.clone();

        let module = module_path!()
            .split_once("::")
            .map_or(module_path!(), |(_, rest)| rest);
        let test_name = format!("{}::lock_file_excludes_other_process", module);
        let mut holder = Command::new(std::env::current_exe().unwrap())
            .args(["--exact", &test_name, "--nocapture", "--test-threads=1", "--quiet"])
            .env(HOLDER_LOCK_FILE, &lock_file)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();

        let stdout = BufReader::new(holder.stdout.take().unwrap());
        let base: u16 = stdout
            .lines()
            .map(Result::unwrap)
            .find_map(|line| line.strip_prefix("HELD ").map(|b| b.trim().parse().unwrap()))
            .expect("holder exited without reserving");
        tracing::info!("Child {} holds [{}, {})", holder.id(), base, base + 4);

        // Nothing in this process knows about the block; only the file does
        let config = PortConfig {
            lock_file,
            probe_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            min_port: base,
            max_port: base + 3,
        };
        let chooser = LockingPortChooser::from_config(&config).unwrap();
        assert!(matches!(
            chooser.reserve_with_limit(1, 50),
            Err(PortError::Exhausted { .. })
        ));

        // The kernel drops the holder's locks with the process
        holder.kill().unwrap();
        holder.wait().unwrap();
        let taken = chooser.reserve_with_limit(4, 1_000).unwrap();
        assert_eq!(taken.base(), base);
        taken.close().unwrap();
    }
}
