//! Simulate command implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use textsync_engine::{
    FrameClient, FrameServer, FramedTransport, LoopbackClient, MemorySurface, SessionConfig,
    SyncError, SyncSession,
};
use textsync_server::{Authority, ServerConfig};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

const WORDS: &[&str] = &["a", "sync", " ", "\n", "ü", "edit", "{}", "x"];
const QUIESCENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Number of clients.
    pub clients: usize,
    /// Edits per client.
    pub edits: usize,
    /// Seed for edits and delays.
    pub seed: u64,
    /// Upper bound of the per-message delay.
    pub max_delay_ms: u64,
}

/// Simulation failures.
#[derive(Debug, Error)]
pub enum SimulateError {
    /// The runtime could not be built.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// A session failed outside the recoverable paths.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Replicas did not reach the authority's state.
    #[error("{diverged} of {clients} clients did not converge")]
    Diverged {
        /// Clients out of step with the authority.
        diverged: usize,
        /// All clients.
        clients: usize,
    },
}

/// Final state of one client.
#[derive(Debug)]
struct ClientReport {
    name: String,
    version: u64,
    pending: usize,
    faults: u64,
    content: String,
}

/// Final state of a simulation.
#[derive(Debug)]
struct Report {
    version: u64,
    document: String,
    clients: Vec<ClientReport>,
}

impl Report {
    fn diverged(&self) -> usize {
        self.clients
            .iter()
            .filter(|c| c.pending > 0 || c.version != self.version || c.content != self.document)
            .count()
    }
}

/// Serves frames from an in-process authority.
struct AuthorityServer(Arc<Authority>);

#[async_trait]
impl FrameServer for AuthorityServer {
    async fn handle_frame(&self, frame: Vec<u8>) -> Vec<u8> {
        self.0.handle_frame(&frame).await
    }
}

/// Loopback client that delays requests and replies by a random amount.
struct DelayedClient {
    inner: LoopbackClient<AuthorityServer>,
    rng: Mutex<StdRng>,
    max_delay_ms: u64,
}

impl DelayedClient {
    fn new(server: Arc<AuthorityServer>, seed: u64, max_delay_ms: u64) -> Self {
        Self {
            inner: LoopbackClient::new(server),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            max_delay_ms,
        }
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.rng.lock().gen_range(0..=self.max_delay_ms))
    }
}

#[async_trait]
impl FrameClient for DelayedClient {
    async fn send(&self, frame: Vec<u8>) -> Result<Vec<u8>, String> {
        tokio::time::sleep(self.delay()).await;
        let reply = self.inner.send(frame).await?;
        tokio::time::sleep(self.delay()).await;
        Ok(reply)
    }
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "Simulating {} clients, {} edits each (seed {})",
        options.clients, options.edits, options.seed
    );
    println!();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(SimulateError::from)?;
    let report = runtime.block_on(simulate(options))?;

    print_report(&report);

    match report.diverged() {
        0 => Ok(()),
        diverged => Err(SimulateError::Diverged {
            diverged,
            clients: report.clients.len(),
        }
        .into()),
    }
}

async fn simulate(options: &SimulateOptions) -> Result<Report, SimulateError> {
    let authority = Arc::new(Authority::new(ServerConfig::default()));
    let server = Arc::new(AuthorityServer(Arc::clone(&authority)));
    let mut rng = StdRng::seed_from_u64(options.seed);

    let mut clients = Vec::with_capacity(options.clients);
    for i in 0..options.clients {
        let name = format!("client-{i}");
        let client = DelayedClient::new(
            Arc::clone(&server),
            options.seed.wrapping_add(i as u64 + 1),
            options.max_delay_ms,
        );
        let surface = Arc::new(MemorySurface::new());
        let session = SyncSession::attach(
            SessionConfig::new().with_client_id(name.as_str()),
            Arc::new(FramedTransport::new(client)),
            Arc::clone(&surface),
        )
        .await?;
        clients.push((name, session, surface));
    }

    info!(
        clients = options.clients,
        edits = options.edits,
        seed = options.seed,
        "sessions attached"
    );

    for _ in 0..options.edits {
        for (_, _, surface) in &clients {
            random_edit(&mut rng, surface)?;
        }
        let pause = rng.gen_range(0..=options.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }

    let deadline = Instant::now() + QUIESCENCE_TIMEOUT;
    loop {
        let settled = clients.iter().all(|(_, session, _)| {
            session.pending().is_empty() && session.version() == authority.version()
        });
        if settled {
            break;
        }
        if Instant::now() >= deadline {
            warn!("clients did not settle before the deadline");
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let report = Report {
        version: authority.version(),
        document: authority.document(),
        clients: clients
            .iter()
            .map(|(name, session, _)| {
                let status = session.status();
                ClientReport {
                    name: name.clone(),
                    version: status.version,
                    pending: status.pending,
                    faults: status.faults,
                    content: session.content(),
                }
            })
            .collect(),
    };

    for (_, session, _) in &clients {
        session.detach();
    }
    Ok(report)
}

fn random_edit(rng: &mut StdRng, surface: &MemorySurface) -> Result<(), SyncError> {
    let len = surface.len();
    if len > 0 && rng.gen_bool(0.4) {
        let at = rng.gen_range(0..len);
        let count = rng.gen_range(1..=(len - at).min(3));
        surface.delete(at, count)
    } else {
        let word = WORDS.choose(rng).copied().unwrap_or("x");
        surface.insert(rng.gen_range(0..=len), word)
    }
}

fn print_report(report: &Report) {
    for client in &report.clients {
        println!(
            "{}: version {}, {} pending, {} faults, {} chars",
            client.name,
            client.version,
            client.pending,
            client.faults,
            client.content.chars().count()
        );
    }
    println!();
    println!("Authority version: {}", report.version);
    println!("Document length:   {} chars", report.document.chars().count());
    if report.diverged() == 0 {
        println!("Status: CONVERGED");
    } else {
        println!("Status: DIVERGED");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_simulation_converges() {
        let options = SimulateOptions {
            clients: 3,
            edits: 5,
            seed: 7,
            max_delay_ms: 2,
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let report = runtime.block_on(simulate(&options)).unwrap();

        assert_eq!(report.clients.len(), 3);
        assert_eq!(report.diverged(), 0);
        assert!(report.version >= 15);
    }

    #[test]
    fn diverged_counts_stragglers() {
        let report = Report {
            version: 2,
            document: "ab".into(),
            clients: vec![
                ClientReport {
                    name: "a".into(),
                    version: 2,
                    pending: 0,
                    faults: 0,
                    content: "ab".into(),
                },
                ClientReport {
                    name: "b".into(),
                    version: 1,
                    pending: 1,
                    faults: 0,
                    content: "b".into(),
                },
            ],
        };
        assert_eq!(report.diverged(), 1);
    }
}
