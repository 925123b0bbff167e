use std::str::FromStr;

use capture_core::{CaptureError, CaptureEvent, CaptureSnapshot};
use shared::domain::CaptureField;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset(CaptureField),
    Submit,
    Cancel,
    Status,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments: {line}"));
        }

        match (verb.as_str(), argument) {
            ("reset", Some(field)) => parse_field(field).map(Command::Reset),
            ("reset", None) => Err("usage: reset <card|cvc|expiry>".into()),
            ("submit", None) => Ok(Command::Submit),
            ("cancel", None) => Ok(Command::Cancel),
            ("status", None) => Ok(Command::Status),
            ("quit" | "exit", None) => Ok(Command::Quit),
            ("", _) => Err("empty command".into()),
            _ => Err(format!(
                "unknown command: {line} (try reset, submit, cancel, status, quit)"
            )),
        }
    }
}

fn parse_field(name: &str) -> Result<CaptureField, String> {
    match name.to_ascii_lowercase().as_str() {
        "card" | "number" | "pan" => Ok(CaptureField::CardNumber),
        "cvc" | "cvv" | "code" => Ok(CaptureField::SecurityCode),
        "expiry" | "exp" | "date" => Ok(CaptureField::ExpirationDate),
        other => other.parse().map_err(|err| format!("{err}")),
    }
}

pub fn describe_event(event: &CaptureEvent) -> String {
    match event {
        CaptureEvent::CaptureStarted {
            call_id,
            payment_id,
        } => format!("capture started for call {call_id} (payment {payment_id})"),
        CaptureEvent::PaymentDataUpdated(remote) => {
            let active = remote
                .active_field
                .map(|field| field.to_string())
                .unwrap_or_else(|| "-".into());
            let required: Vec<_> = remote
                .required_fields
                .iter()
                .map(ToString::to_string)
                .chain(remote.unrecognized_required.iter().cloned())
                .collect();
            let mut line = format!("update: active={active} required=[{}]", required.join(", "));
            for (field, value) in &remote.masked_values {
                line.push_str(&format!(" {field}={value}"));
            }
            if remote.partial_result {
                line.push_str(" (partial)");
            }
            line
        }
        CaptureEvent::CaptureTypeChanged { field } => format!("now capturing {field}"),
        CaptureEvent::CaptureComplete => "all fields captured; ready to submit".into(),
        CaptureEvent::CaptureStalled {
            unaddressed,
            unrecognized,
        } => {
            let fields: Vec<_> = unaddressed
                .iter()
                .map(ToString::to_string)
                .chain(unrecognized.iter().cloned())
                .collect();
            format!(
                "capture stalled: gateway still requires [{}]; reset a field or cancel",
                fields.join(", ")
            )
        }
        CaptureEvent::SyncTimeout { elapsed } => {
            let err = CaptureError::StaleSession { elapsed: *elapsed };
            with_hint(err.to_string(), err.remediation_hint())
        }
        CaptureEvent::PaymentSubmitted { payment_id } => format!("payment {payment_id} submitted"),
        CaptureEvent::PaymentCancelled { payment_id } => format!("payment {payment_id} cancelled"),
        CaptureEvent::Error(err) => with_hint(format!("error: {err}"), err.remediation_hint()),
    }
}

pub fn describe_snapshot(snapshot: &CaptureSnapshot) -> String {
    let order: Vec<_> = snapshot.order.iter().map(ToString::to_string).collect();
    let payment = snapshot
        .session
        .payment_id
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".into());
    let target = snapshot
        .confirmed_target
        .map(|field| field.to_string())
        .unwrap_or_else(|| "-".into());
    format!(
        "phase={:?} payment={payment} target={target} order=[{}] can_submit={}",
        snapshot.phase,
        order.join(", "),
        snapshot.session.can_submit
    )
}

fn with_hint(message: String, hint: Option<&str>) -> String {
    match hint {
        Some(hint) => format!("{message}\n  hint: {hint}"),
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use capture_core::RemoteCaptureState;
    use shared::domain::PaymentId;

    use super::*;

    #[test]
    fn parses_commands_and_field_aliases() {
        assert_eq!(
            "reset card".parse::<Command>(),
            Ok(Command::Reset(CaptureField::CardNumber))
        );
        assert_eq!(
            "RESET security-code".parse::<Command>(),
            Ok(Command::Reset(CaptureField::SecurityCode))
        );
        assert_eq!(
            "reset expiry".parse::<Command>(),
            Ok(Command::Reset(CaptureField::ExpirationDate))
        );
        assert_eq!("  submit ".parse::<Command>(), Ok(Command::Submit));
        assert_eq!("exit".parse::<Command>(), Ok(Command::Quit));
        assert_eq!("status".parse::<Command>(), Ok(Command::Status));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!("reset".parse::<Command>().is_err());
        assert!("reset postal-code".parse::<Command>().is_err());
        assert!("submit now".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
        assert!("charge".parse::<Command>().is_err());
    }

    #[test]
    fn describes_updates_with_masked_values() {
        let mut remote = RemoteCaptureState {
            payment_id: Some(PaymentId::new("PK1")),
            active_field: Some(CaptureField::SecurityCode),
            required_fields: [CaptureField::ExpirationDate].into_iter().collect(),
            ..RemoteCaptureState::default()
        };
        remote
            .masked_values
            .insert(CaptureField::CardNumber, "xxxxxxxxxxxx4242".into());

        let line = describe_event(&CaptureEvent::PaymentDataUpdated(remote));
        assert_eq!(
            line,
            "update: active=security-code required=[expiration-date] \
             payment-card-number=xxxxxxxxxxxx4242"
        );
    }

    #[test]
    fn stall_lists_fields_the_console_cannot_capture() {
        let line = describe_event(&CaptureEvent::CaptureStalled {
            unaddressed: [CaptureField::SecurityCode].into_iter().collect(),
            unrecognized: ["postal-code".to_string()].into_iter().collect(),
        });
        assert!(line.contains("[security-code, postal-code]"));
    }

    #[test]
    fn timeout_description_carries_a_hint() {
        let line = describe_event(&CaptureEvent::SyncTimeout {
            elapsed: Duration::from_secs(16),
        });
        assert!(line.starts_with("no capture update received for 16s"));
        assert!(line.contains("hint:"));
    }
}
