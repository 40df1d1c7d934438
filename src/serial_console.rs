use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use regex::Regex;
use serialport::SerialPort;

const RX_LINES_MAX: usize = 16 * 1024;

/// Line-oriented view over a serial byte stream.
///
/// Complete lines are kept in a bounded history addressed by a monotonically increasing
/// cursor; the unterminated tail is kept separately so interactive prompts such as
/// `User:` can be matched before a newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    rx_buf: Vec<u8>,
    lines: VecDeque<String>,
    line_cursor: usize,
}

impl LineBuffer {
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.rx_buf.extend_from_slice(bytes);
        for byte in &mut self.rx_buf {
            if *byte == b'\r' {
                *byte = b'\n';
            }
        }

        while let Some(pos) = self.rx_buf.iter().position(|b| *b == b'\n') {
            let line = self.rx_buf.drain(..=pos).collect::<Vec<u8>>();
            let parsed = String::from_utf8_lossy(&line).trim().to_string();
            if parsed.is_empty() {
                continue;
            }
            self.lines.push_back(parsed);
            self.line_cursor += 1;
            while self.lines.len() > RX_LINES_MAX {
                self.lines.pop_front();
            }
        }
    }

    pub fn mark(&self) -> usize {
        self.line_cursor
    }

    pub fn lines_since(&self, start_mark: usize) -> Vec<String> {
        let start = start_mark.min(self.line_cursor);
        let offset = self.line_cursor.saturating_sub(self.lines.len());
        let begin = start.saturating_sub(offset);
        self.lines.iter().skip(begin).cloned().collect()
    }

    /// Text received after the last line break.
    pub fn tail(&self) -> String {
        String::from_utf8_lossy(&self.rx_buf).trim().to_string()
    }

    pub fn clear_tail(&mut self) {
        self.rx_buf.clear();
    }
}

pub struct SerialConsole {
    port: Box<dyn SerialPort>,
    buffer: LineBuffer,
}

impl SerialConsole {
    pub fn open(port: &str, baud: u32) -> Result<Self> {
        let serial = serialport::new(port, baud)
            .timeout(Duration::from_millis(50))
            .open()
            .with_context(|| format!("failed to open serial port {port} @ {baud}"))?;
        Ok(Self {
            port: serial,
            buffer: LineBuffer::default(),
        })
    }

    pub fn send_line(&mut self, line: &str) -> Result<()> {
        self.buffer.clear_tail();
        self.port
            .write_all(line.as_bytes())
            .context("failed to write serial payload")?;
        self.port.write_all(b"\r\n")?;
        self.port.flush()?;
        Ok(())
    }

    pub fn mark(&self) -> usize {
        self.buffer.mark()
    }

    pub fn lines_since(&self, start_mark: usize) -> Vec<String> {
        self.buffer.lines_since(start_mark)
    }

    /// Waits until the unterminated tail matches one of `prompts` and returns its index.
    pub fn wait_for_prompt(
        &mut self,
        prompts: &[&Regex],
        timeout: Duration,
    ) -> Result<Option<usize>> {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll_once()?;
            let tail = self.buffer.tail();
            if let Some(index) = prompts.iter().position(|re| re.is_match(&tail)) {
                return Ok(Some(index));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    pub fn poll_once(&mut self) -> Result<()> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.buffer.push_bytes(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::TimedOut => break,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err).context("failed reading serial stream"),
            }
        }
        Ok(())
    }
}
