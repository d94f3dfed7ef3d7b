
use std::{
    io::{self, Read, Write},
    sync::{Arc, Mutex, MutexGuard},
};

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

// used to mock a serial interface to test the bus
// the idea is that read contains bytes which can be read and write bytes
// that are expected to be written. once they are written/read they are removed
// from the corresponding buffer. if read is empty we time out like a real serial
// port would, if the content in write didnt match what is being written we panic.
// add_read and add_write add bytes to the corresponding buffers
//
// instead of scripting the writes, a responder can be installed. it gets every
// flushed request and can answer it like a device on the bus would, or stay
// silent by returning None
//
// don't be alarmed if you think it's slow or inefficient or anything, it doesn't
// need to be fast nor pretty nor efficient, its just for testing. it needs to be
// easy
#[derive(Default)]
struct State {
    read: Vec<u8>,
    write: Vec<u8>,
    pending: Vec<u8>,
    responder: Option<Responder>,
    writes: usize,
}

pub struct Interface {
    state: Arc<Mutex<State>>,
}

impl Read for Interface {
    fn read(&mut self, mut buf: &mut [u8]) -> io::Result<usize> {
        let mut s = self.lock();
        let q = &mut s.read;
        if q.is_empty() {
            Err(io::Error::new(io::ErrorKind::TimedOut, "read was empty"))
        } else if buf.len() > q.len() {
            buf.write_all(q)?;
            let res = q.len();
            q.drain(..);
            Ok(res)
        } else {
            // write_all advances buf, so take the length first
            let n = buf.len();
            buf.write_all(&q[..n])?;
            q.drain(..n);
            Ok(n)
        }
    }
}

impl Write for Interface {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut s = self.lock();
        s.writes += 1;
        if s.responder.is_some() {
            s.pending.extend_from_slice(buf);
            return Ok(buf.len());
        }
        let q = &mut s.write;
        if q.is_empty() {
            panic!("write was empty")
        } else if q.starts_with(buf) {
            q.drain(..buf.len());
            Ok(buf.len())
        } else {
            panic!("write didn't start with {:?}, write was {:?}", buf, q)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self.lock();
        let s = &mut *guard;
        let request = std::mem::take(&mut s.pending);
        if request.is_empty() {
            return Ok(());
        }
        if let Some(responder) = s.responder.as_mut() {
            if let Some(reply) = responder(&request) {
                s.read.extend_from_slice(&reply);
            }
        }
        Ok(())
    }
}

impl Clone for Interface {
    fn clone(&self) -> Self {
        Interface {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for Interface {
    fn default() -> Self {
        Self::new()
    }
}

impl Interface {
    pub fn new() -> Self {
        Interface {
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Builds an interface that hands every flushed request to `responder`
    /// and queues whatever it returns for reading
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        let i = Self::new();
        i.lock().responder = Some(Box::new(responder));
        i
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panicking test poisons the lock, the state is still fine to look at
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_read(&mut self, buf: &[u8]) {
        self.lock().read.extend_from_slice(buf)
    }

    pub fn add_write(&mut self, buf: &[u8]) {
        self.lock().write.extend_from_slice(buf)
    }

    /// Expects `request` to be written and answers it with `reply`
    pub fn add_exchange(&mut self, request: &[u8], reply: &[u8]) {
        self.add_write(request);
        self.add_read(reply);
    }

    /// Returns `true` if all expected bytes were written and all bytes were read
    pub fn is_empty(&self) -> bool {
        let s = self.lock();
        s.read.is_empty() && s.write.is_empty()
    }

    /// Number of bytes that are waiting to be read
    pub fn pending_read(&self) -> usize {
        self.lock().read.len()
    }

    /// Number of calls to `write` so far
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }
}
