//! Minimal asynchronous SMTP server for mail intake.

pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SmtpError};
use crate::relay::{MailHandler, ReceivedMail};
use session::{Event, Session};

/// SMTP listener that hands completed transactions to a [`MailHandler`].
pub struct SmtpServer {
    listener: TcpListener,
    handler: Arc<dyn MailHandler>,
    hostname: String,
}

impl SmtpServer {
    /// Binds the listener. The server does not accept connections until
    /// [`serve`](Self::serve) runs.
    pub async fn bind(addr: &str, handler: Arc<dyn MailHandler>) -> Result<SmtpServer> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SmtpError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(SmtpServer {
            listener,
            handler,
            hostname: hostname(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr().map_err(SmtpError::Io)?)
    }

    /// Accept loop. Each connection runs in its own task, so a slow client
    /// or a slow webhook cannot stall new sessions.
    pub async fn serve(self) -> Result<()> {
        info!("SMTP listening on {}", self.local_addr()?);
        loop {
            let (stream, peer) = self.listener.accept().await.map_err(SmtpError::Io)?;
            debug!("connection from {peer}");
            let handler = Arc::clone(&self.handler);
            let hostname = self.hostname.clone();
            tokio::spawn(async move {
                if let Err(err) = serve_connection(stream, peer, hostname, handler).await {
                    warn!("connection from {peer} ended with error: {err}");
                }
            });
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hostname: String,
    handler: Arc<dyn MailHandler>,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut session = Session::new(hostname, peer);

    write_line(&mut write_half, &session.greeting()).await?;

    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(SmtpError::Io)?;
        if read == 0 {
            debug!("connection from {peer} closed by client");
            return Ok(());
        }
        match session.feed_line(&line) {
            Event::Continue => {}
            Event::Reply(reply) => write_line(&mut write_half, &reply).await?,
            Event::Submit { envelope, data } => {
                let mail = ReceivedMail::new(envelope, data);
                let id = mail.id;
                info!(
                    "mail {id} from <{}> for {} recipient(s) ({} bytes)",
                    mail.envelope.mail_from,
                    mail.envelope.rcpt_to.len(),
                    mail.data.len(),
                );
                let reply = match handler.handle(mail).await {
                    Ok(_) => "250 OK",
                    Err(err) => {
                        error!("handling mail {id} failed: {err}");
                        "451 Error: local error in processing"
                    }
                };
                write_line(&mut write_half, reply).await?;
            }
            Event::Close(reply) => {
                write_line(&mut write_half, &reply).await?;
                return Ok(());
            }
        }
    }
}

async fn write_line(stream: &mut (impl AsyncWriteExt + Unpin), line: &str) -> Result<()> {
    stream
        .write_all(line.as_bytes())
        .await
        .map_err(SmtpError::Io)?;
    stream.write_all(b"\r\n").await.map_err(SmtpError::Io)?;
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
