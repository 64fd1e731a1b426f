//! Remote command protocol
//!
//! Frames carry OSC packets. Each message's address pattern selects one
//! [`RemoteCommand`]; unknown patterns are ignored so newer clients can talk
//! to older panels. Bundles are flattened in order.
//!
//! | Address              | Arguments                 | Command                     |
//! |----------------------|---------------------------|-----------------------------|
//! | `/NextPage`          | gate                      | `NextPage`                  |
//! | `/PrevPage`          | gate                      | `PrevPage`                  |
//! | `/NextModule`        | gate                      | `NextModule`                |
//! | `/PrevModule`        | gate                      | `PrevModule`                |
//! | `/Param1`..`/Param4` | numeric                   | `ChangeParam` (steps 8000)  |
//! | `/AuxAct`            | int                       | `AuxActive`                 |
//! | `/AuxLed`            | int                       | `AuxLed`                    |
//! | `/AuxLine`           | string, string...         | `AuxLine`                   |
//! | `/YieldDisplay`      | gate                      | `YieldDisplay`              |
//! | `/monome/enc/delta`  | int encoder, int rotation | `ChangeParam` (steps 2048)  |
//!
//! A gate is open when it is a float `>= 0.5` or an int `> 0`. Navigation
//! commands only fire on an open gate, so a controller button sends its
//! action on press and nothing on release.

use crate::error::ProtocolError;
use rosc::{OscMessage, OscPacket, OscType};

/// Step scale for `/ParamN`
pub const PARAM_STEPS: f32 = 8000.0;
/// Step scale for `/monome/enc/delta` (arc resolution is 1024 per turn)
pub const ENCODER_STEPS: f32 = 2048.0;

/// A decoded remote command
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCommand {
    NextPage,
    PrevPage,
    NextModule,
    PrevModule,
    /// Relative change of parameter `index`; the engine divides `value` by `steps`
    ChangeParam { index: usize, value: f32, steps: f32 },
    AuxActive(bool),
    AuxLed(i32),
    AuxLine(String),
    YieldDisplay(bool),
}

/// Gate rule shared by all button-like arguments
pub fn is_gate_open(arg: &OscType) -> bool {
    match arg {
        OscType::Float(v) => *v >= 0.5,
        OscType::Int(v) => *v > 0,
        _ => false,
    }
}

/// Decode a frame into its messages, bundle contents flattened in order
pub fn decode_packet(bytes: &[u8]) -> Result<Vec<OscMessage>, ProtocolError> {
    let (_, packet) =
        rosc::decoder::decode_udp(bytes).map_err(|e| ProtocolError::Decode(format!("{:?}", e)))?;
    let mut messages = Vec::new();
    flatten(packet, &mut messages);
    Ok(messages)
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for p in bundle.content {
                flatten(p, out);
            }
        }
    }
}

/// Map one message to a command
///
/// `Ok(None)` means the message is valid but has no effect: an unknown
/// address, or a navigation gate that is closed.
pub fn parse_message(msg: &OscMessage) -> Result<Option<RemoteCommand>, ProtocolError> {
    let addr = msg.addr.as_str();
    let args = &msg.args;

    let cmd = match addr {
        "/NextPage" => gated(addr, args, RemoteCommand::NextPage)?,
        "/PrevPage" => gated(addr, args, RemoteCommand::PrevPage)?,
        "/NextModule" => gated(addr, args, RemoteCommand::NextModule)?,
        "/PrevModule" => gated(addr, args, RemoteCommand::PrevModule)?,
        "/Param1" | "/Param2" | "/Param3" | "/Param4" => {
            let index = match addr {
                "/Param1" => 0,
                "/Param2" => 1,
                "/Param3" => 2,
                _ => 3,
            };
            Some(RemoteCommand::ChangeParam {
                index,
                value: numeric_arg(addr, args, 0)?,
                steps: PARAM_STEPS,
            })
        }
        "/AuxAct" => Some(RemoteCommand::AuxActive(int_arg(addr, args, 0)? == 1)),
        "/AuxLed" => Some(RemoteCommand::AuxLed(int_arg(addr, args, 0)?)),
        "/AuxLine" => {
            let mut line = string_arg(addr, args, 0)?.to_string();
            for arg in &args[1..] {
                match arg {
                    OscType::String(s) => {
                        line.push(' ');
                        line.push_str(s);
                    }
                    _ => break,
                }
            }
            Some(RemoteCommand::AuxLine(line))
        }
        "/YieldDisplay" => Some(RemoteCommand::YieldDisplay(is_gate_open(arg(addr, args, 0)?))),
        "/monome/enc/delta" => {
            let encoder = int_arg(addr, args, 0)?;
            let rotation = int_arg(addr, args, 1)?;
            let index = usize::try_from(encoder).map_err(|_| ProtocolError::WrongType {
                address: addr.to_string(),
                index: 0,
                expected: "non-negative int",
            })?;
            Some(RemoteCommand::ChangeParam {
                index,
                value: encoder_magnitude(rotation),
                steps: ENCODER_STEPS,
            })
        }
        _ => {
            log::trace!("Ignoring unknown OSC address {}", addr);
            None
        }
    };
    Ok(cmd)
}

/// Accelerated magnitude for a raw arc rotation: `sign * (rotation / 3)^2`
pub fn encoder_magnitude(rotation: i32) -> f32 {
    let delta = rotation as f32 / 3.0;
    (rotation.signum() as f32) * delta * delta
}

fn gated(
    addr: &str,
    args: &[OscType],
    cmd: RemoteCommand,
) -> Result<Option<RemoteCommand>, ProtocolError> {
    Ok(is_gate_open(arg(addr, args, 0)?).then_some(cmd))
}

fn arg<'a>(addr: &str, args: &'a [OscType], index: usize) -> Result<&'a OscType, ProtocolError> {
    args.get(index).ok_or_else(|| ProtocolError::MissingArgument {
        address: addr.to_string(),
        index,
    })
}

fn numeric_arg(addr: &str, args: &[OscType], index: usize) -> Result<f32, ProtocolError> {
    match arg(addr, args, index)? {
        OscType::Float(v) => Ok(*v),
        OscType::Int(v) => Ok(*v as f32),
        _ => Err(ProtocolError::WrongType {
            address: addr.to_string(),
            index,
            expected: "float or int",
        }),
    }
}

fn int_arg(addr: &str, args: &[OscType], index: usize) -> Result<i32, ProtocolError> {
    match arg(addr, args, index)? {
        OscType::Int(v) => Ok(*v),
        _ => Err(ProtocolError::WrongType {
            address: addr.to_string(),
            index,
            expected: "int",
        }),
    }
}

fn string_arg<'a>(addr: &str, args: &'a [OscType], index: usize) -> Result<&'a str, ProtocolError> {
    match arg(addr, args, index)? {
        OscType::String(s) => Ok(s.as_str()),
        _ => Err(ProtocolError::WrongType {
            address: addr.to_string(),
            index,
            expected: "string",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscBundle, OscTime};

    fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    fn parse(addr: &str, args: Vec<OscType>) -> Result<Option<RemoteCommand>, ProtocolError> {
        parse_message(&msg(addr, args))
    }

    #[test]
    fn test_gate_rule() {
        assert!(is_gate_open(&OscType::Float(0.5)));
        assert!(is_gate_open(&OscType::Float(1.0)));
        assert!(!is_gate_open(&OscType::Float(0.49)));
        assert!(!is_gate_open(&OscType::Float(-1.0)));
        assert!(is_gate_open(&OscType::Int(1)));
        assert!(!is_gate_open(&OscType::Int(0)));
        assert!(!is_gate_open(&OscType::Int(-3)));
        assert!(!is_gate_open(&OscType::String("1".into())));
        assert!(!is_gate_open(&OscType::Nil));
    }

    #[test]
    fn test_navigation_gated() {
        assert_eq!(
            parse("/NextPage", vec![OscType::Float(1.0)]).unwrap(),
            Some(RemoteCommand::NextPage)
        );
        assert_eq!(parse("/NextPage", vec![OscType::Float(0.0)]).unwrap(), None);
        assert_eq!(
            parse("/PrevModule", vec![OscType::Int(1)]).unwrap(),
            Some(RemoteCommand::PrevModule)
        );
        assert_eq!(parse("/PrevModule", vec![OscType::String("x".into())]).unwrap(), None);
        assert!(matches!(
            parse("/NextModule", vec![]),
            Err(ProtocolError::MissingArgument { index: 0, .. })
        ));
    }

    #[test]
    fn test_param_steps() {
        assert_eq!(
            parse("/Param3", vec![OscType::Float(-1.0)]).unwrap(),
            Some(RemoteCommand::ChangeParam {
                index: 2,
                value: -1.0,
                steps: 8000.0
            })
        );
        assert_eq!(
            parse("/Param1", vec![OscType::Int(5)]).unwrap(),
            Some(RemoteCommand::ChangeParam {
                index: 0,
                value: 5.0,
                steps: 8000.0
            })
        );
        assert!(matches!(
            parse("/Param2", vec![OscType::String("up".into())]),
            Err(ProtocolError::WrongType { index: 0, .. })
        ));
    }

    #[test]
    fn test_encoder_delta() {
        assert_eq!(
            parse("/monome/enc/delta", vec![OscType::Int(0), OscType::Int(6)]).unwrap(),
            Some(RemoteCommand::ChangeParam {
                index: 0,
                value: 4.0,
                steps: 2048.0
            })
        );
        assert_eq!(encoder_magnitude(-6), -4.0);
        assert_eq!(encoder_magnitude(0), 0.0);
        assert!(matches!(
            parse("/monome/enc/delta", vec![OscType::Int(1)]),
            Err(ProtocolError::MissingArgument { index: 1, .. })
        ));
        assert!(parse("/monome/enc/delta", vec![OscType::Int(-1), OscType::Int(3)]).is_err());
    }

    #[test]
    fn test_aux_commands() {
        assert_eq!(
            parse("/AuxAct", vec![OscType::Int(1)]).unwrap(),
            Some(RemoteCommand::AuxActive(true))
        );
        assert_eq!(
            parse("/AuxAct", vec![OscType::Int(2)]).unwrap(),
            Some(RemoteCommand::AuxActive(false))
        );
        assert_eq!(
            parse("/AuxLed", vec![OscType::Int(7)]).unwrap(),
            Some(RemoteCommand::AuxLed(7))
        );
        assert_eq!(
            parse(
                "/AuxLine",
                vec![
                    OscType::String("seq".into()),
                    OscType::String("bar".into()),
                    OscType::String("4".into()),
                    OscType::Int(9),
                    OscType::String("ignored".into()),
                ]
            )
            .unwrap(),
            Some(RemoteCommand::AuxLine("seq bar 4".into()))
        );
        assert!(parse("/AuxLed", vec![OscType::Float(1.0)]).is_err());
    }

    #[test]
    fn test_yield_display() {
        assert_eq!(
            parse("/YieldDisplay", vec![OscType::Int(1)]).unwrap(),
            Some(RemoteCommand::YieldDisplay(true))
        );
        assert_eq!(
            parse("/YieldDisplay", vec![OscType::Float(0.2)]).unwrap(),
            Some(RemoteCommand::YieldDisplay(false))
        );
    }

    #[test]
    fn test_unknown_address_ignored() {
        assert_eq!(parse("/Param5", vec![OscType::Int(1)]).unwrap(), None);
        assert_eq!(parse("/nope", vec![]).unwrap(), None);
    }

    #[test]
    fn test_bundle_flattened_in_order() {
        let packet = OscPacket::Bundle(OscBundle {
            timetag: OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![
                OscPacket::Message(msg("/NextPage", vec![OscType::Int(1)])),
                OscPacket::Bundle(OscBundle {
                    timetag: OscTime {
                        seconds: 0,
                        fractional: 1,
                    },
                    content: vec![OscPacket::Message(msg("/AuxLed", vec![OscType::Int(2)]))],
                }),
                OscPacket::Message(msg("/PrevPage", vec![OscType::Int(1)])),
            ],
        });
        let bytes = rosc::encoder::encode(&packet).unwrap();
        let addrs: Vec<String> = decode_packet(&bytes)
            .unwrap()
            .into_iter()
            .map(|m| m.addr)
            .collect();
        assert_eq!(addrs, vec!["/NextPage", "/AuxLed", "/PrevPage"]);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            decode_packet(b"not osc at all"),
            Err(ProtocolError::Decode(_))
        ));
    }
}
