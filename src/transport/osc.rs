use anyhow::{anyhow, Context, Result};
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use super::ControlSink;

pub const DEFAULT_OSC_TARGET: &str = "127.0.0.1:4567";

/// Resolve `host:port`, optionally prefixed with `osc.udp://` or `udp://`.
pub fn parse_osc_target(target: &str) -> Result<SocketAddr> {
    let mut remainder = target.trim();
    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "osc.udp" | "udp" => {}
            other => return Err(anyhow!("unsupported OSC scheme: {}", other)),
        }
        remainder = rest.trim_end_matches('/');
    }
    remainder
        .to_socket_addrs()
        .with_context(|| format!("invalid OSC target: {}", target))?
        .next()
        .ok_or_else(|| anyhow!("OSC target {} did not resolve", target))
}

/// Sends each value as a single-float OSC message in its own UDP datagram.
pub struct OscSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl OscSender {
    pub fn new(target: &str) -> Result<Self> {
        let target = parse_osc_target(target)?;
        let bind_addr = if target.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).context("bind OSC socket")?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl ControlSink for OscSender {
    fn send(&self, address: &str, value: f32) -> Result<()> {
        let packet = OscPacket::Message(OscMessage {
            addr: address.to_string(),
            args: vec![OscType::Float(value)],
        });
        let data = encoder::encode(&packet)?;
        self.socket
            .send_to(&data, self.target)
            .with_context(|| format!("send {} to {}", address, self.target))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parses_plain_and_scheme_targets() -> Result<()> {
        assert_eq!(parse_osc_target("127.0.0.1:4567")?.port(), 4567);
        assert_eq!(parse_osc_target("osc.udp://127.0.0.1:9000/")?.port(), 9000);
        assert!(parse_osc_target("tcp://127.0.0.1:9000").is_err());
        assert!(parse_osc_target("no-port").is_err());
        Ok(())
    }

    #[test]
    fn sends_decodable_float_messages() -> Result<()> {
        let listener = UdpSocket::bind("127.0.0.1:0")?;
        listener.set_read_timeout(Some(Duration::from_secs(2)))?;
        let sender = OscSender::new(&listener.local_addr()?.to_string())?;

        sender.send("/hand/distance", 0.25)?;

        let mut buf = [0u8; 256];
        let (len, _) = listener.recv_from(&mut buf)?;
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len])?;
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/hand/distance");
                assert_eq!(msg.args, vec![OscType::Float(0.25)]);
            }
            other => panic!("unexpected packet {:?}", other),
        }
        Ok(())
    }
}
