//! Operator console: turns stdin lines into frames for the agent.

use arti_bridge::ControlMessage;
use tokio_tungstenite::tungstenite::Message;

/// One thing to push to connected agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Raw terminal input.
    Data(Vec<u8>),
    Control(ControlMessage),
}

impl Outgoing {
    pub fn into_message(self) -> Result<Message, serde_json::Error> {
        Ok(match self {
            Outgoing::Data(data) => Message::Binary(data.into()),
            Outgoing::Control(msg) => Message::Text(serde_json::to_string(&msg)?.into()),
        })
    }
}

/// Parse one stdin line.
///
/// `/resize ROWS COLS` becomes a resize control message; anything else is
/// sent as terminal input with the newline restored.
pub fn parse_line(line: &str) -> Result<Outgoing, String> {
    let Some(rest) = line.trim().strip_prefix("/resize") else {
        let mut data = line.as_bytes().to_vec();
        data.push(b'\n');
        return Ok(Outgoing::Data(data));
    };

    let dims: Vec<&str> = rest.split_whitespace().collect();
    let [rows, cols] = dims.as_slice() else {
        return Err("usage: /resize ROWS COLS".into());
    };
    let rows: u16 = rows
        .parse()
        .map_err(|_| format!("invalid rows '{rows}'"))?;
    let cols: u16 = cols
        .parse()
        .map_err(|_| format!("invalid cols '{cols}'"))?;
    if rows == 0 || cols == 0 {
        return Err("rows and cols must be positive".into());
    }

    Ok(Outgoing::Control(ControlMessage::Resize { rows, cols }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_become_input_with_newline() {
        assert_eq!(
            parse_line("ls -la").unwrap(),
            Outgoing::Data(b"ls -la\n".to_vec())
        );
        assert_eq!(parse_line("").unwrap(), Outgoing::Data(b"\n".to_vec()));
    }

    #[test]
    fn resize_command_becomes_control() {
        assert_eq!(
            parse_line("/resize 40 120").unwrap(),
            Outgoing::Control(ControlMessage::Resize { rows: 40, cols: 120 })
        );
        assert_eq!(
            parse_line("  /resize   50 200 ").unwrap(),
            Outgoing::Control(ControlMessage::Resize { rows: 50, cols: 200 })
        );
    }

    #[test]
    fn malformed_resize_is_rejected() {
        assert!(parse_line("/resize").is_err());
        assert!(parse_line("/resize 40").is_err());
        assert!(parse_line("/resize 40 x").is_err());
        assert!(parse_line("/resize 0 80").is_err());
        assert!(parse_line("/resize 40 80 1").is_err());
    }

    #[test]
    fn messages_use_the_wire_frame_kinds() {
        let msg = Outgoing::Data(b"pwd\n".to_vec()).into_message().unwrap();
        assert_eq!(msg, Message::Binary(b"pwd\n".to_vec().into()));

        let msg = Outgoing::Control(ControlMessage::Resize { rows: 40, cols: 120 })
            .into_message()
            .unwrap();
        assert_eq!(
            msg,
            Message::Text(String::from(r#"{"type":"resize","rows":40,"cols":120}"#).into())
        );
    }
}
