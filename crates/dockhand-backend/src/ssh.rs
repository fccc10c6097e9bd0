//! One transient SSH session per operation.
//!
//! Sessions are blocking by design (libssh2); every caller reaches this
//! module through the crate's blocking-dispatch helper so the scheduler
//! never stalls. A session is torn down on every exit path: the libssh2
//! handles disconnect when the owning value drops, command failure
//! included.

use std::io::Read;
use std::net::TcpStream;

use ssh2::Session;
use tracing::debug;

use dockhand_common::{HostDescriptor, SshAuth};

use crate::{BackendError, Result};

/// Captured result of one remote command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl CommandOutput {
    /// Stdout followed by stderr, the way `docker logs` output is consumed.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

/// An authenticated session against one remote host.
pub struct SshSession {
    session: Session,
    host: String,
}

impl SshSession {
    /// Connect and authenticate. A configured password is preferred over a
    /// key file; a descriptor with neither is a connection error.
    pub fn connect(host: &HostDescriptor) -> Result<Self> {
        let addr = host
            .ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| connection_error(&host.name, "no address configured"))?;
        let user = host
            .ssh_user
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| connection_error(&host.name, "no ssh user configured"))?;

        let tcp = TcpStream::connect((addr, host.ssh_port()))
            .map_err(|e| connection_error(&host.name, e))?;
        let mut session = Session::new().map_err(|e| connection_error(&host.name, e))?;
        session.set_tcp_stream(tcp);
        // No known-hosts verification: the remote key is trusted on first
        // use. Acceptable for an operator tool on a trusted network only.
        session
            .handshake()
            .map_err(|e| connection_error(&host.name, e))?;

        match host.ssh_auth() {
            Some(SshAuth::Password(password)) => session
                .userauth_password(user, &password)
                .map_err(|e| connection_error(&host.name, e))?,
            Some(SshAuth::KeyFile(path)) => session
                .userauth_pubkey_file(user, None, &path, None)
                .map_err(|e| connection_error(&host.name, e))?,
            None => {
                return Err(connection_error(
                    &host.name,
                    "no password or key file configured",
                ))
            }
        }

        debug!(host = %host.name, user, "ssh session established");
        Ok(Self {
            session,
            host: host.name.clone(),
        })
    }

    /// Execute exactly one command and capture its output and exit status.
    pub fn exec(&self, command: &str) -> Result<CommandOutput> {
        debug!(host = %self.host, command, "executing remote command");
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| connection_error(&self.host, e))?;
        channel
            .exec(command)
            .map_err(|e| connection_error(&self.host, e))?;

        let mut stdout = Vec::new();
        channel.read_to_end(&mut stdout)?;
        let mut stderr = Vec::new();
        channel.stderr().read_to_end(&mut stderr)?;

        channel
            .wait_close()
            .map_err(|e| connection_error(&self.host, e))?;
        let status = channel
            .exit_status()
            .map_err(|e| connection_error(&self.host, e))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            status,
        })
    }

    /// [`exec`](Self::exec), but a non-zero exit becomes a command error
    /// carrying the captured stderr.
    pub fn exec_checked(&self, command: &str) -> Result<CommandOutput> {
        let output = self.exec(command)?;
        if output.status != 0 {
            return Err(BackendError::Command {
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run a long-lived command (e.g. `docker logs -f`) and forward its
    /// merged output to the sink chunk by chunk. Returns when the command
    /// reaches EOF or the consumer hangs up; either way the channel and
    /// session are released.
    pub fn exec_streamed(self, command: &str, sink: &crate::stream::LogSink) -> Result<()> {
        debug!(host = %self.host, command, "streaming remote command");
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| connection_error(&self.host, e))?;
        channel
            .exec(command)
            .map_err(|e| connection_error(&self.host, e))?;

        let mut buf = [0u8; 1024];
        loop {
            let n = channel.read(&mut buf)?;
            if n == 0 {
                break;
            }
            if !sink.send(String::from_utf8_lossy(&buf[..n]).into_owned()) {
                debug!(host = %self.host, "log consumer disconnected, closing channel");
                break;
            }
        }
        let _ = channel.close();
        Ok(())
    }
}

fn connection_error(host: &str, reason: impl ToString) -> BackendError {
    BackendError::Connection {
        host: host.to_string(),
        reason: reason.to_string(),
    }
}
