use std::io::{self, Write};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Where a child's stdout or stderr goes.
pub trait OutputSink: Send {
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Everything written so far, if this sink keeps it.
    fn take_text(&mut self) -> Option<String>;
}

/// Forwards output to one of our own standard streams as it arrives.
pub struct Passthrough {
    dest: Box<dyn Write + Send>,
}

impl Passthrough {
    pub fn new(dest: Box<dyn Write + Send>) -> Self {
        Self { dest }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(io::stderr()))
    }
}

impl OutputSink for Passthrough {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.dest.write_all(buf)?;
        self.dest.flush()
    }

    fn take_text(&mut self) -> Option<String> {
        None
    }
}

/// Keeps output in memory so it can be logged as one block later.
#[derive(Debug, Default)]
pub struct Buffered {
    buf: Vec<u8>,
}

impl OutputSink for Buffered {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(buf);
        Ok(())
    }

    fn take_text(&mut self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(text)
    }
}

/// Run a subprocess to completion, copying its stdout and stderr into the
/// given sinks as it runs.
pub async fn run_cmd(
    cmd: &mut Command,
    stdout: &mut dyn OutputSink,
    stderr: &mut dyn OutputSink,
) -> io::Result<ExitStatus> {
    let mut child = cmd
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let child_out = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("Cannot attach to child stdout"))?;
    let child_err = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("Cannot attach to child stderr"))?;

    let copied = tokio::try_join!(communicate(child_out, stdout), communicate(child_err, stderr));
    if let Err(e) = copied {
        // nobody is reading its output any more
        if let Err(kill_err) = child.kill().await {
            log::warn!("could not kill child after output error: {kill_err}");
        }
        return Err(e);
    }

    child.wait().await
}

async fn communicate<R: AsyncRead + Unpin>(
    mut stream: R,
    output: &mut dyn OutputSink,
) -> io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let num_read = stream.read(&mut buf).await?;
        if num_read == 0 {
            break;
        }
        output.write(&buf[..num_read])?;
    }
    Ok(())
}
