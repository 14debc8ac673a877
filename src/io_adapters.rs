use std::collections::VecDeque;
use std::io::{Cursor, ErrorKind, Read, Result as IoResult, Write};
use std::sync::mpsc::{self, Receiver, SendError, Sender};
use std::sync::{Arc, Mutex, PoisonError};

/// Blocking "read next byte" capability the shell is driven by.
///
/// `Ok(None)` signals end of input. A blanket implementation covers every
/// [`Read`], so stdin, serial ports, sockets and the adapters below all work.
pub trait ByteSource {
    fn read_byte(&mut self) -> IoResult<Option<u8>>;
}

impl<R: Read + ?Sized> ByteSource for R {
    fn read_byte(&mut self) -> IoResult<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Memory-backed input, handy for scripted sessions.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            cursor: Cursor::new(buf.into()),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

/// Memory-backed output that can be inspected from another thread while the
/// shell still owns the writer.
pub struct MemWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemWriter {
    /// Create a writer together with a handle to the collected bytes.
    pub fn with_handle() -> (Self, OutputHandle) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        (Self { buf: buf.clone() }, OutputHandle { buf })
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

/// Read side of a [`MemWriter`].
#[derive(Clone)]
pub struct OutputHandle {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl OutputHandle {
    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Input fed from another thread, e.g. a radio or serial receive task.
///
/// Reads block until bytes arrive. Dropping every [`ByteSender`] ends the
/// input once the queued bytes are consumed.
pub struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

/// Feeding side of a [`ChannelReader`].
#[derive(Clone)]
pub struct ByteSender {
    tx: Sender<Vec<u8>>,
}

impl ByteSender {
    pub fn send(&self, bytes: impl Into<Vec<u8>>) -> Result<(), SendError<Vec<u8>>> {
        self.tx.send(bytes.into())
    }
}

/// Create a connected sender/reader pair.
pub fn channel() -> (ByteSender, ChannelReader) {
    let (tx, rx) = mpsc::channel();
    (
        ByteSender { tx },
        ChannelReader {
            rx,
            pending: VecDeque::new(),
        },
    )
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.pending.len());
        for (slot, byte) in out.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_mem_reader_yields_bytes_then_eof() {
        let mut reader = MemReader::new("ab");
        assert_eq!(reader.read_byte().unwrap(), Some(b'a'));
        assert_eq!(reader.read_byte().unwrap(), Some(b'b'));
        assert_eq!(reader.read_byte().unwrap(), None);
    }

    #[test]
    fn test_mem_writer_handle_sees_writes() {
        let (mut writer, handle) = MemWriter::with_handle();
        write!(writer, "hello ").unwrap();
        writer.write_all(b"world").unwrap();
        assert_eq!(handle.contents(), "hello world");
    }

    #[test]
    fn test_channel_reader_blocks_until_data_and_ends_on_drop() {
        let (tx, mut reader) = channel();
        let feeder = thread::spawn(move || {
            tx.send("hi").unwrap();
            tx.send(vec![b'!']).unwrap();
        });

        let mut got = Vec::new();
        while let Some(b) = reader.read_byte().unwrap() {
            got.push(b);
        }
        feeder.join().unwrap();
        assert_eq!(got, b"hi!");
    }
}
