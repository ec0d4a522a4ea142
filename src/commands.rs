//! Textual host command surface.
//!
//! One command per line, whitespace separated, mirroring the calls a host bridge
//! makes into the session:
//!
//! ```text
//! init
//! attach 5 0x1234 0x5678
//! activate | start | stop | detach | dispose
//! pid 0.015 0 0.004 0.015 0 0.004
//! policy center
//! manual 0.5 -0.2 300
//! frame
//! ```

use crate::control::PidGains;
use crate::session::DeviceSession;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default duration of a manual pan/tilt request.
pub const DEFAULT_MANUAL_DURATION_MS: i32 = 300;

/// Errors produced while parsing a command line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("{command}: missing argument <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("{command}: invalid value '{value}' for <{argument}>")]
    InvalidArgument {
        command: &'static str,
        argument: &'static str,
        value: String,
    },

    #[error("{0}: too many arguments")]
    TooManyArguments(&'static str),
}

/// A parsed host command.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Init,
    Attach {
        descriptor: i32,
        vendor_id: u16,
        product_id: u16,
    },
    Activate,
    Start,
    Stop,
    Detach,
    Dispose,
    Pid(PidGains),
    Policy(String),
    Manual {
        pan: f32,
        tilt: f32,
        duration_ms: i32,
    },
    Frame,
}

/// Result of dispatching a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub ok: bool,
    pub detail: Option<String>,
}

impl CommandOutcome {
    fn flag(ok: bool) -> Self {
        Self { ok, detail: None }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} {}", self.ok, detail),
            None => write!(f, "{}", self.ok),
        }
    }
}

/// Parse an integer in decimal or `0x` hexadecimal.
fn parse_int<T>(text: &str) -> Option<T>
where
    T: TryFrom<i64>,
{
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => text.parse::<i64>().ok()?,
    };
    T::try_from(value).ok()
}

/// Argument cursor for one command.
struct Args<'a> {
    command: &'static str,
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn next(&mut self, argument: &'static str) -> Result<&'a str, CommandError> {
        self.tokens.next().ok_or(CommandError::MissingArgument {
            command: self.command,
            argument,
        })
    }

    fn invalid(&self, argument: &'static str, value: &str) -> CommandError {
        CommandError::InvalidArgument {
            command: self.command,
            argument,
            value: value.to_string(),
        }
    }

    fn int<T: TryFrom<i64>>(&mut self, argument: &'static str) -> Result<T, CommandError> {
        let token = self.next(argument)?;
        parse_int(token).ok_or_else(|| self.invalid(argument, token))
    }

    fn float(&mut self, argument: &'static str) -> Result<f32, CommandError> {
        let token = self.next(argument)?;
        token
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.invalid(argument, token))
    }

    fn optional_int<T: TryFrom<i64>>(
        &mut self,
        argument: &'static str,
        default: T,
    ) -> Result<T, CommandError> {
        match self.tokens.next() {
            Some(token) => parse_int(token).ok_or_else(|| self.invalid(argument, token)),
            None => Ok(default),
        }
    }

    fn finish<T>(mut self, value: T) -> Result<T, CommandError> {
        match self.tokens.next() {
            Some(_) => Err(CommandError::TooManyArguments(self.command)),
            None => Ok(value),
        }
    }
}

impl FromStr for HostCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next().ok_or(CommandError::Empty)?;

        let command: &'static str = match name.to_ascii_lowercase().as_str() {
            "init" => "init",
            "attach" => "attach",
            "activate" => "activate",
            "start" => "start",
            "stop" => "stop",
            "detach" => "detach",
            "dispose" => "dispose",
            "pid" => "pid",
            "policy" => "policy",
            "manual" => "manual",
            "frame" => "frame",
            _ => return Err(CommandError::Unknown(name.to_string())),
        };
        let mut args = Args { command, tokens };

        match command {
            "init" => args.finish(HostCommand::Init),
            "activate" => args.finish(HostCommand::Activate),
            "start" => args.finish(HostCommand::Start),
            "stop" => args.finish(HostCommand::Stop),
            "detach" => args.finish(HostCommand::Detach),
            "dispose" => args.finish(HostCommand::Dispose),
            "frame" => args.finish(HostCommand::Frame),
            "attach" => {
                let descriptor = args.int("fd")?;
                let vendor_id = args.int("vid")?;
                let product_id = args.int("pid")?;
                args.finish(HostCommand::Attach {
                    descriptor,
                    vendor_id,
                    product_id,
                })
            }
            "pid" => {
                let gains = PidGains::new(
                    args.float("kpX")?,
                    args.float("kiX")?,
                    args.float("kdX")?,
                    args.float("kpY")?,
                    args.float("kiY")?,
                    args.float("kdY")?,
                );
                args.finish(HostCommand::Pid(gains))
            }
            "policy" => {
                let name = args.next("name")?.to_string();
                args.finish(HostCommand::Policy(name))
            }
            "manual" => {
                let pan = args.float("pan")?;
                let tilt = args.float("tilt")?;
                let duration_ms = args.optional_int("durationMs", DEFAULT_MANUAL_DURATION_MS)?;
                args.finish(HostCommand::Manual {
                    pan,
                    tilt,
                    duration_ms,
                })
            }
            _ => Err(CommandError::Unknown(name.to_string())),
        }
    }
}

/// Run `command` against `session`.
pub fn dispatch(session: &DeviceSession, command: &HostCommand) -> CommandOutcome {
    match command {
        HostCommand::Init => CommandOutcome::flag(session.init()),
        HostCommand::Attach {
            descriptor,
            vendor_id,
            product_id,
        } => CommandOutcome::flag(session.attach(*descriptor, *vendor_id, *product_id)),
        HostCommand::Activate => CommandOutcome::flag(session.activate()),
        HostCommand::Start => CommandOutcome::flag(session.start()),
        HostCommand::Stop => CommandOutcome::flag(session.stop()),
        HostCommand::Detach => CommandOutcome::flag(session.detach()),
        HostCommand::Dispose => CommandOutcome::flag(session.dispose()),
        HostCommand::Pid(gains) => CommandOutcome::flag(session.set_control_parameters(*gains)),
        HostCommand::Policy(name) => CommandOutcome::flag(session.set_target_policy(name)),
        HostCommand::Manual {
            pan,
            tilt,
            duration_ms,
        } => CommandOutcome::flag(session.manual_control(*pan, *tilt, *duration_ms)),
        HostCommand::Frame => match session.frame_snapshot() {
            Some(frame) => CommandOutcome {
                ok: true,
                detail: Some(format!(
                    "width={} height={} encoding={} bytes={}",
                    frame.width,
                    frame.height,
                    frame.encoding.code(),
                    frame.payload.len()
                )),
            },
            None => CommandOutcome {
                ok: false,
                detail: Some("no frame".to_string()),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attach_with_hex_ids() {
        let cmd: HostCommand = "attach 5 0x1234 22136".parse().unwrap();
        assert_eq!(
            cmd,
            HostCommand::Attach {
                descriptor: 5,
                vendor_id: 0x1234,
                product_id: 0x5678,
            }
        );
        let cmd: HostCommand = "ATTACH -1 0 0".parse().unwrap();
        assert!(matches!(cmd, HostCommand::Attach { descriptor: -1, .. }));
    }

    #[test]
    fn manual_duration_defaults() {
        let cmd: HostCommand = "manual 0.5 -0.2".parse().unwrap();
        assert_eq!(
            cmd,
            HostCommand::Manual {
                pan: 0.5,
                tilt: -0.2,
                duration_ms: DEFAULT_MANUAL_DURATION_MS,
            }
        );
    }

    #[test]
    fn pid_takes_six_gains() {
        let cmd: HostCommand = "pid 0.1 0 0.02 0.2 0 0.03".parse().unwrap();
        let HostCommand::Pid(gains) = cmd else {
            panic!("expected pid command");
        };
        assert_eq!(gains.kp_y, 0.2);
        assert_eq!(
            "pid 0.1 0 0.02".parse::<HostCommand>(),
            Err(CommandError::MissingArgument {
                command: "pid",
                argument: "kpY",
            })
        );
    }

    #[test]
    fn reports_typed_errors() {
        assert_eq!("".parse::<HostCommand>(), Err(CommandError::Empty));
        assert_eq!(
            "zoom 2".parse::<HostCommand>(),
            Err(CommandError::Unknown("zoom".into()))
        );
        assert_eq!(
            "start now".parse::<HostCommand>(),
            Err(CommandError::TooManyArguments("start"))
        );
        // vendor id does not fit in u16
        assert!(matches!(
            "attach 5 0x12345 1".parse::<HostCommand>(),
            Err(CommandError::InvalidArgument { argument: "vid", .. })
        ));
        assert!(matches!(
            "manual left 0".parse::<HostCommand>(),
            Err(CommandError::InvalidArgument { argument: "pan", .. })
        ));
    }

    #[test]
    fn outcome_renders_detail() {
        let outcome = CommandOutcome {
            ok: true,
            detail: Some("width=2 height=2 encoding=1 bytes=8".into()),
        };
        assert_eq!(outcome.to_string(), "true width=2 height=2 encoding=1 bytes=8");
        assert_eq!(CommandOutcome::flag(false).to_string(), "false");
    }

    #[cfg(feature = "mock")]
    #[test]
    fn dispatch_drives_session() {
        use crate::events::CollectingSink;
        use crate::mock::MockDriver;
        use std::sync::Arc;

        let driver = MockDriver::builder().accept_any().build();
        let session = DeviceSession::new(Arc::new(driver.clone()), Arc::new(CollectingSink::new()));

        let run = |line: &str| dispatch(&session, &line.parse::<HostCommand>().unwrap());
        assert!(run("attach 5 0x1234 0x5678").ok);
        assert!(!run("frame").ok);
        assert!(run("start").ok);
        driver.deliver_pattern(8, 0);
        let frame = run("frame");
        assert!(frame.ok);
        assert_eq!(
            frame.detail.as_deref(),
            Some("width=1920 height=1080 encoding=2 bytes=8")
        );
        assert!(!run("policy tallest").ok);
        assert!(run("dispose").ok);
    }
}
