//! Reader drivers: pull a byte source chunk by chunk into a [`Transboxer`]
//! and finish the stream at end of input.

use std::io::{self, Read};

use tracing::trace;

use crate::error::Result;
use crate::transboxer::{Counts, TransboxSink, Transboxer};

/// Feed everything `reader` yields, in reads of up to `chunk_size` bytes,
/// then end the stream.
pub fn transbox_reader<R, S>(
    mut reader: R,
    transboxer: &mut Transboxer<S>,
    chunk_size: usize,
) -> Result<Counts>
where
    R: Read,
    S: TransboxSink,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        trace!(len = n, "read chunk");
        transboxer.write_buffer(&buf[..n])?;
    }
    transboxer.end()?;
    Ok(transboxer.counts())
}

/// Async counterpart of [`transbox_reader`]. Each read is announced with a
/// write ticket before awaiting, so the stream cannot finish under it.
#[cfg(feature = "async")]
pub async fn transbox_async<R, S>(
    mut reader: R,
    transboxer: &mut Transboxer<S>,
    chunk_size: usize,
) -> Result<Counts>
where
    R: tokio::io::AsyncRead + Unpin,
    S: TransboxSink,
{
    use tokio::io::AsyncReadExt;

    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let ticket = transboxer.begin_write()?;
        let n = match reader.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                transboxer.cancel_write(ticket)?;
                return Err(e.into());
            }
        };
        if n == 0 {
            transboxer.cancel_write(ticket)?;
            break;
        }
        trace!(len = n, "read chunk");
        transboxer.complete_write(ticket, &buf[..n])?;
    }
    transboxer.end()?;
    Ok(transboxer.counts())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransboxConfig;
    use crate::error::Error;
    use crate::transboxer::Collector;
    use assert_matches::assert_matches;

    /// Yields `Interrupted` once, then delegates.
    struct Flaky<R> {
        inner: R,
        interrupted: bool,
    }

    impl<R: Read> Read for Flaky<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::ErrorKind::Interrupted.into());
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn test_reader_counts_chunks() {
        // An EBML header with an empty DocType.
        let input = [0x1A, 0x45, 0xDF, 0xA3, 0x83, 0x42, 0x82, 0x80];
        let reader = Flaky {
            inner: &input[..],
            interrupted: false,
        };
        let mut t = Transboxer::new(TransboxConfig::default(), Collector::default());

        let counts = transbox_reader(reader, &mut t, 3).unwrap();
        assert_eq!(counts.packets, 3);
        assert_eq!(counts.bytes, 8);
        assert!(t.is_finished());
        assert_eq!(t.sink().counts, Some(counts));
    }

    #[test]
    fn test_reader_error_propagates() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
        }
        let mut t = Transboxer::new(TransboxConfig::default(), Collector::default());
        assert_matches!(transbox_reader(Broken, &mut t, 16), Err(Error::Io(_)));
        assert!(!t.is_finished());
    }
}
