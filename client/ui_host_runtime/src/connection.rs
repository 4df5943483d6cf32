use crate::error::{Result, RuntimeError, TransportError};
use crate::navigation::{NavigationRequest, NavigationResponse, OperationsRequest};
use crate::operation::Operation;
use crate::protocol::{
    self, ClientEnvelope, NavigationService, OperationService, REQUEST_FRAME_CAP, RESPONSE_FRAME_CAP,
    ServerEnvelope, Service,
};
use rand::Rng;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Opens channels to a server address.
pub trait Connector {
    type Channel: Channel;

    fn connect(&self, address: &str) -> Result<Self::Channel, TransportError>;
}

/// One live bidirectional channel carrying unary calls.
pub trait Channel {
    fn call(&mut self, request: &ClientEnvelope) -> Result<ServerEnvelope, TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// `min(base * 2^attempt, max)`.
    pub fn backoff_cap(&self, attempt: u32) -> Duration {
        let factor = 2_f64.powi(attempt.min(i32::MAX as u32) as i32);
        let scaled = self.base_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// Uniform jitter over `[0, cap)`; the cap is applied before the jitter.
    pub fn backoff_delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let cap = self.backoff_cap(attempt).as_secs_f64();
        if cap <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(rng.gen_range(0.0..cap))
    }
}

/// Owns the channel to the server and hides transport failures behind
/// bounded reconnects and retries.
pub struct ConnectionManager<C: Connector> {
    address: String,
    connector: C,
    policy: RetryPolicy,
    channel: Option<C::Channel>,
    reconnects: u32,
}

impl<C: Connector> ConnectionManager<C> {
    /// Connects right away; fails only when every reconnect attempt failed.
    pub fn connect(address: impl Into<String>, connector: C, policy: RetryPolicy) -> Result<Self> {
        let mut manager = Self {
            address: address.into(),
            connector,
            policy,
            channel: None,
            reconnects: 0,
        };
        manager.reconnect()?;
        Ok(manager)
    }

    pub fn get_navigation(&mut self, request: &NavigationRequest) -> Result<NavigationResponse> {
        self.attempt_rpc::<NavigationService>(request)
    }

    pub fn get_operations(&mut self, request: &OperationsRequest) -> Result<Vec<Operation>> {
        self.attempt_rpc::<OperationService>(request)
    }

    pub fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            match channel.close() {
                Ok(()) => info!(address = %self.address, "disconnected"),
                Err(err) => warn!(address = %self.address, "error while closing channel: {err}"),
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Successful reconnects so far, the initial connection included.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnects
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn reconnect(&mut self) -> Result<()> {
        self.disconnect();
        let mut rng = rand::thread_rng();

        for attempt in 0..self.policy.max_retries {
            debug!(address = %self.address, attempt = attempt + 1, "connecting");

            match self.connector.connect(&self.address) {
                Ok(mut channel) => match check_connection(&mut channel) {
                    Ok(()) => {
                        info!(address = %self.address, attempt = attempt + 1, "connected");
                        self.channel = Some(channel);
                        self.reconnects += 1;
                        return Ok(());
                    }
                    Err(err) => {
                        warn!(address = %self.address, attempt = attempt + 1, "health check failed: {err}");
                        if let Err(err) = channel.close() {
                            warn!(address = %self.address, "failed to close unhealthy channel: {err}");
                        }
                    }
                },
                Err(err) => {
                    warn!(address = %self.address, attempt = attempt + 1, "connect failed: {err}");
                }
            }

            if attempt + 1 < self.policy.max_retries {
                let delay = self.policy.backoff_delay(attempt, &mut rng);
                debug!(?delay, "backing off before reconnect");
                thread::sleep(delay);
            }
        }

        Err(RuntimeError::Connectivity {
            address: self.address.clone(),
            attempts: self.policy.max_retries,
        })
    }

    fn attempt_rpc<S: Service>(&mut self, request: &S::Request) -> Result<S::Response> {
        let envelope = S::envelope(request);
        let mut last_error = None;

        for attempt in 0..=self.policy.max_retries {
            if self.channel.is_none() {
                self.reconnect()?;
            }
            let Some(channel) = self.channel.as_mut() else {
                continue;
            };

            let outcome = channel.call(&envelope).and_then(S::decode);
            match outcome {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(fault)) => {
                    return Err(RuntimeError::Remote {
                        code: fault.code,
                        message: fault.message,
                    });
                }
                Err(err) => {
                    warn!(call = S::NAME, attempt = attempt + 1, "call failed: {err}");
                    self.disconnect();
                    last_error = Some(err);
                }
            }
        }

        Err(RuntimeError::RetriesExhausted {
            call: S::NAME,
            retries: self.policy.max_retries,
            source: last_error.unwrap_or(TransportError::Unresolved(self.address.clone())),
        })
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Any reply to a ping proves the channel is alive.
fn check_connection(channel: &mut impl Channel) -> Result<(), TransportError> {
    channel.call(&ClientEnvelope::Ping).map(|_| ())
}

/// Plain TCP carrying length-prefixed JSON frames.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for TcpConnector {
    type Channel = TcpChannel;

    fn connect(&self, address: &str) -> Result<TcpChannel, TransportError> {
        let socket_addr = address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::Unresolved(address.to_string()))?;

        let stream = TcpStream::connect_timeout(&socket_addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;

        let reader = BufReader::new(stream.try_clone()?);
        Ok(TcpChannel {
            reader,
            writer: BufWriter::new(stream),
        })
    }
}

pub struct TcpChannel {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Channel for TcpChannel {
    fn call(&mut self, request: &ClientEnvelope) -> Result<ServerEnvelope, TransportError> {
        protocol::write_envelope(&mut self.writer, request, REQUEST_FRAME_CAP)?;
        protocol::read_envelope(&mut self.reader, RESPONSE_FRAME_CAP)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.writer.get_ref().shutdown(Shutdown::Both)?;
        Ok(())
    }
}
