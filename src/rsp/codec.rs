//! RSP packet framing: `$<payload>#cc` with a mod-256 checksum,
//! plus `+`/`-` ack handling.

use std::io::{self, Read, Write};

pub enum RecvOutcome {
    Packet(String),
    ChecksumMismatch,
    ConnectionLost,
}

pub struct PacketIo<S> {
    stream: S,
}

impl<S: Read + Write> PacketIo<S> {
    pub fn new(stream: S) -> Self {
        PacketIo { stream }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.stream.read(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    /// Reads one packet, validating its checksum and emitting the
    /// appropriate ack when `noack_mode` is off.
    pub fn recv_packet(&mut self, noack_mode: bool) -> io::Result<RecvOutcome> {
        loop {
            match self.read_byte()? {
                None => return Ok(RecvOutcome::ConnectionLost),
                Some(b'$') => break,
                Some(_) => continue,
            }
        }

        let mut payload = Vec::new();
        let mut sum: u8 = 0;
        loop {
            match self.read_byte()? {
                None => return Ok(RecvOutcome::ConnectionLost),
                Some(b'#') => break,
                Some(b) => {
                    payload.push(b);
                    sum = sum.wrapping_add(b);
                }
            }
        }

        let hi = self.read_byte()?;
        let lo = self.read_byte()?;
        let (Some(hi), Some(lo)) = (hi, lo) else {
            return Ok(RecvOutcome::ConnectionLost);
        };
        let their_checksum = hex_pair(hi, lo);

        if their_checksum != Some(sum) {
            if !noack_mode {
                self.stream.write_all(b"-")?;
                self.stream.flush()?;
            }
            return Ok(RecvOutcome::ChecksumMismatch);
        }

        if !noack_mode {
            self.stream.write_all(b"+")?;
            self.stream.flush()?;
        }
        Ok(RecvOutcome::Packet(String::from_utf8_lossy(&payload).into_owned()))
    }

    /// Frames and sends a reply payload, flushing after every write.
    pub fn send_reply(&mut self, payload: &str) -> io::Result<()> {
        let sum = checksum(payload.as_bytes());
        let frame = format!("${}#{:02x}", payload, sum);
        self.stream.write_all(frame.as_bytes())?;
        self.stream.flush()
    }
}

pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let h = (hi as char).to_digit(16)?;
    let l = (lo as char).to_digit(16)?;
    Some(((h << 4) | l) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct DuplexBuf {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for DuplexBuf {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for DuplexBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn io_with(input: &str) -> PacketIo<DuplexBuf> {
        PacketIo::new(DuplexBuf {
            input: Cursor::new(input.as_bytes().to_vec()),
            output: Vec::new(),
        })
    }

    #[test]
    fn checksum_is_sum_mod_256() {
        assert_eq!(checksum(b"OK"), (b'O' as u16 + b'K' as u16) as u8);
    }

    #[test]
    fn round_trips_a_correct_packet() {
        let payload = "qSupported:multiprocess+";
        let cc = checksum(payload.as_bytes());
        let wire = format!("${}#{:02x}", payload, cc);
        let mut io = io_with(&wire);
        match io.recv_packet(false).unwrap() {
            RecvOutcome::Packet(p) => assert_eq!(p, payload),
            _ => panic!("expected a packet"),
        }
        assert_eq!(io.stream.output, b"+");
    }

    #[test]
    fn wrong_checksum_sends_nak_and_no_payload() {
        let wire = "$OK#00"; // wrong checksum for "OK" (0x4f+0x4b=0x9a)
        let mut io = io_with(wire);
        match io.recv_packet(false).unwrap() {
            RecvOutcome::ChecksumMismatch => {}
            _ => panic!("expected a checksum mismatch"),
        }
        assert_eq!(io.stream.output, b"-");
    }

    #[test]
    fn noack_mode_sends_no_ack() {
        let payload = "vMustReplyEmpty";
        let cc = checksum(payload.as_bytes());
        let wire = format!("${}#{:02x}", payload, cc);
        let mut io = io_with(&wire);
        io.recv_packet(true).unwrap();
        assert!(io.stream.output.is_empty());
    }

    #[test]
    fn truncated_stream_is_connection_lost() {
        let mut io = io_with("$abc");
        match io.recv_packet(false).unwrap() {
            RecvOutcome::ConnectionLost => {}
            _ => panic!("expected connection lost"),
        }
    }

    #[test]
    fn send_reply_frames_with_checksum() {
        let mut io = io_with("");
        io.send_reply("OK").unwrap();
        assert_eq!(io.stream.output, b"$OK#9a");
    }
}
