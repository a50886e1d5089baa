//! Packet relay between the virtual interface and the tunnel
//!
//! One task awaits both directions, a periodic check and the stop signal with
//! `tokio::select!`. Two clocks drive the liveness policy:
//!
//! - `last_tunnel_send`: refreshed by every datagram written to the tunnel,
//!   keepalives included. When it falls `keepalive_interval` behind, a
//!   keepalive burst goes out.
//! - `last_tunnel_recv`: refreshed by every datagram read from the tunnel,
//!   control messages included. When it falls `receive_timeout` behind, the
//!   relay fails with [`Error::Timeout`].
//!
//! Both are checked every idle interval. Branches are polled in random order
//! so a busy interface cannot starve the tunnel side or the check.

use tokio::time::{self, Instant, MissedTickBehavior};
use wicket_protocol::wire::{CONTROL_REPEAT, KEEPALIVE};
use wicket_protocol::{Datagram, DatagramTransport, VirtualInterface, MAX_PACKET_SIZE};

use crate::config::TimingConfig;
use crate::error::Error;
use crate::stop::{stopped, StopSignal};

/// Traffic counters for one relay run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Packets read from the interface and sent into the tunnel
    pub packets_out: u64,
    pub bytes_out: u64,
    /// Packets received from the tunnel and written to the interface
    pub packets_in: u64,
    pub bytes_in: u64,
    /// Keepalive bursts sent
    pub keepalive_bursts: u64,
    /// Control datagrams received and dropped
    pub control_dropped: u64,
}

impl std::fmt::Display for RelayStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "out={} pkts/{} B, in={} pkts/{} B, keepalives={}, control={}",
            self.packets_out,
            self.bytes_out,
            self.packets_in,
            self.bytes_in,
            self.keepalive_bursts,
            self.control_dropped
        )
    }
}

/// Moves packets between a transport and an interface
pub struct Relay<'a, T: ?Sized, I: ?Sized> {
    transport: &'a T,
    iface: &'a I,
    timing: &'a TimingConfig,
    stats: RelayStats,
}

impl<'a, T, I> Relay<'a, T, I>
where
    T: DatagramTransport + ?Sized,
    I: VirtualInterface + ?Sized,
{
    pub fn new(transport: &'a T, iface: &'a I, timing: &'a TimingConfig) -> Self {
        Self {
            transport,
            iface,
            timing,
            stats: RelayStats::default(),
        }
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Pump packets until something stops the relay. The returned error says
    /// what: a transport or interface failure, [`Error::Timeout`] when the
    /// gateway went quiet, or [`Error::Cancelled`] when `stop` fired.
    pub async fn run(&mut self, stop: &mut StopSignal) -> Error {
        let transport = self.transport;
        let iface = self.iface;
        let idle = self.timing.idle_interval();
        let keepalive_interval = self.timing.keepalive_interval();
        let receive_timeout = self.timing.receive_timeout();

        let mut outbound = vec![0u8; MAX_PACKET_SIZE];
        let mut inbound = vec![0u8; MAX_PACKET_SIZE];

        let started = Instant::now();
        let mut last_tunnel_send = started;
        let mut last_tunnel_recv = started;

        let mut check = time::interval_at(started + idle, idle);
        check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stopped(stop) => return Error::Cancelled,

                read = iface.recv(&mut outbound) => {
                    let n = match read {
                        Ok(n) => n,
                        Err(e) => return e.into(),
                    };
                    if n == 0 {
                        continue;
                    }
                    if let Err(e) = transport.send(&outbound[..n]).await {
                        return e.into();
                    }
                    last_tunnel_send = Instant::now();
                    self.stats.packets_out += 1;
                    self.stats.bytes_out += n as u64;
                }

                read = transport.recv(&mut inbound) => {
                    let n = match read {
                        Ok(n) => n,
                        Err(e) => return e.into(),
                    };
                    last_tunnel_recv = Instant::now();

                    match Datagram::classify(&inbound[..n]) {
                        Some(Datagram::Data(packet)) => {
                            if let Err(e) = iface.send(packet).await {
                                return e.into();
                            }
                            self.stats.packets_in += 1;
                            self.stats.bytes_in += n as u64;
                        }
                        Some(Datagram::Control(_)) => self.stats.control_dropped += 1,
                        None => {}
                    }
                }

                _ = check.tick() => {
                    let now = Instant::now();
                    if now.duration_since(last_tunnel_send) >= keepalive_interval {
                        for _ in 0..CONTROL_REPEAT {
                            if let Err(e) = transport.send(&KEEPALIVE).await {
                                return e.into();
                            }
                        }
                        last_tunnel_send = Instant::now();
                        self.stats.keepalive_bursts += 1;
                        log::debug!("Sent keepalive burst");
                    } else if now.duration_since(last_tunnel_recv) >= receive_timeout {
                        return Error::Timeout(format!(
                            "nothing received from gateway for {:?}",
                            now.duration_since(last_tunnel_recv)
                        ));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stop::stop_channel;
    use std::time::Duration;
    use wicket_protocol::transport::mock::{MockDatagram, MockInterface};

    fn ipv4_packet(tag: u8) -> Vec<u8> {
        vec![0x45, 0x00, 0x00, 0x15, tag, 0, 0, 0, 64, 17, 0, 0, 10, 0, 0, 2, 10, 0, 0, 1, tag]
    }

    fn is_keepalive(datagram: &[u8]) -> bool {
        datagram == KEEPALIVE
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_both_directions() {
        let (iface, mut host) = MockInterface::new("tun-test");
        let (client, gateway) = MockDatagram::pair();
        let timing = TimingConfig::default();
        let (tx, mut stop) = stop_channel();

        host.inject(ipv4_packet(1));
        gateway.send(&ipv4_packet(2)).await.unwrap();

        let driver = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let n = gateway.recv(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], &ipv4_packet(1)[..]);
            assert_eq!(host.next_delivered().await, Some(ipv4_packet(2)));
            tx.send_replace(true);
            (gateway, host)
        });

        let mut relay = Relay::new(&client, &iface, &timing);
        let err = relay.run(&mut stop).await;
        driver.await.unwrap();

        assert!(err.is_cancelled());
        assert_eq!(relay.stats().packets_out, 1);
        assert_eq!(relay.stats().packets_in, 1);
        assert_eq!(relay.stats().bytes_in, ipv4_packet(2).len() as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_datagrams_never_reach_interface() {
        let (iface, mut host) = MockInterface::new("tun-test");
        let (client, gateway) = MockDatagram::pair();
        let timing = TimingConfig::default();
        let (tx, mut stop) = stop_channel();

        gateway.send(&[0]).await.unwrap();
        gateway.send(&[0, b'm', b',', b'1']).await.unwrap();
        gateway.send(&ipv4_packet(7)).await.unwrap();

        let driver = tokio::spawn(async move {
            let delivered = host.next_delivered().await;
            tx.send_replace(true);
            (delivered, gateway, host)
        });

        let mut relay = Relay::new(&client, &iface, &timing);
        relay.run(&mut stop).await;
        let (delivered, _gateway, mut host) = driver.await.unwrap();

        assert_eq!(delivered, Some(ipv4_packet(7)));
        assert!(host.drain_delivered().is_empty());
        assert_eq!(relay.stats().control_dropped, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sending_without_receiving_times_out_at_receive_timeout() {
        let (iface, host) = MockInterface::new("tun-test");
        let (client, _gateway) = MockDatagram::pair();
        let timing = TimingConfig::default();
        let (_tx, mut stop) = stop_channel();

        let injector = tokio::spawn(async move {
            for tag in 1..=60u8 {
                host.inject(ipv4_packet(tag));
                time::sleep(Duration::from_millis(500)).await;
            }
            host
        });

        let started = Instant::now();
        let mut relay = Relay::new(&client, &iface, &timing);
        let err = relay.run(&mut stop).await;
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::Timeout(_)), "{err}");
        assert!(elapsed >= Duration::from_secs(20), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(20_100), "{:?}", elapsed);
        assert!(!client.sent().iter().any(|d| is_keepalive(d)));
        injector.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sends_one_keepalive_burst_then_times_out() {
        let (iface, _host) = MockInterface::new("tun-test");
        let (client, _gateway) = MockDatagram::pair();
        let timing = TimingConfig::default();
        let (_tx, mut stop) = stop_channel();

        let started = Instant::now();
        let mut relay = Relay::new(&client, &iface, &timing);
        let err = relay.run(&mut stop).await;
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::Timeout(_)), "{err}");
        assert!(elapsed >= Duration::from_secs(20), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(20_100), "{:?}", elapsed);
        assert_eq!(client.sent(), vec![vec![0u8]; 3]);
        assert_eq!(relay.stats().keepalive_bursts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_keepalive_keeps_relay_alive() {
        let (iface, _host) = MockInterface::new("tun-test");
        let (client, gateway) = MockDatagram::pair();
        let timing = TimingConfig::default();
        let (tx, mut stop) = stop_channel();

        // Echo every keepalive back, as a live gateway does
        let echo = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            loop {
                let n = gateway.recv(&mut buf).await.unwrap();
                gateway.send(&buf[..n]).await.unwrap();
            }
        });
        let stopper = tokio::spawn(async move {
            time::sleep(Duration::from_secs(25)).await;
            tx.send_replace(true);
        });

        let mut relay = Relay::new(&client, &iface, &timing);
        let err = relay.run(&mut stop).await;

        assert!(err.is_cancelled(), "{err}");
        assert_eq!(relay.stats().keepalive_bursts, 1);
        assert_eq!(relay.stats().control_dropped, 3);
        stopper.await.unwrap();
        echo.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_flood_does_not_starve_inbound() {
        const FLOOD: usize = 5000;

        let (iface, mut host) = MockInterface::new("tun-test");
        let (client, gateway) = MockDatagram::pair();
        let timing = TimingConfig::default();
        let (tx, mut stop) = stop_channel();

        gateway.send(&ipv4_packet(200)).await.unwrap();
        for i in 0..FLOOD {
            host.inject(ipv4_packet(i as u8));
        }

        let driver = tokio::spawn(async move {
            let delivered = host.next_delivered().await;
            tx.send_replace(true);
            (delivered, gateway, host)
        });

        let mut relay = Relay::new(&client, &iface, &timing);
        let err = relay.run(&mut stop).await;
        let (delivered, _gateway, _host) = driver.await.unwrap();

        assert!(err.is_cancelled(), "{err}");
        assert_eq!(delivered, Some(ipv4_packet(200)));
        assert_eq!(relay.stats().packets_in, 1);
        assert!(
            relay.stats().packets_out < 1000,
            "inbound waited behind {} outbound packets",
            relay.stats().packets_out
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interface_failure_ends_relay() {
        let (iface, _host) = MockInterface::new("tun-test");
        let (client, _gateway) = MockDatagram::pair();
        let timing = TimingConfig::default();
        let (_tx, mut stop) = stop_channel();

        iface.close().unwrap();

        let mut relay = Relay::new(&client, &iface, &timing);
        let err = relay.run(&mut stop).await;
        assert!(err.is_recoverable(), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_prompt() {
        let (iface, _host) = MockInterface::new("tun-test");
        let (client, _gateway) = MockDatagram::pair();
        let timing = TimingConfig::default();
        let (tx, mut stop) = stop_channel();

        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            tx.send_replace(true);
        });

        let started = Instant::now();
        let mut relay = Relay::new(&client, &iface, &timing);
        assert!(relay.run(&mut stop).await.is_cancelled());
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(client.sent().is_empty());
    }
}
