//! Listener ownership.
//!
//! The supervisor binds every TCP listener and keeps its own duplicate of the
//! socket, lending a tokio listener to the subsystem that serves it. A
//! subsystem dropping its handle never closes the underlying socket, so the
//! set can be handed to a replacement process intact.

use std::io;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use tokio::net::TcpListener;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ListenerSet {
    retained: Mutex<Vec<std::net::TcpListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `addr`, retain the socket, and lend a tokio listener for it.
    pub async fn bind(&self, addr: &str) -> io::Result<TcpListener> {
        let listener = TcpListener::bind(addr).await?;
        let std_listener = listener.into_std()?;
        let retained = std_listener.try_clone()?;
        debug!("Retained listener {}", retained.local_addr()?);
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(retained);
        TcpListener::from_std(std_listener)
    }

    /// Lend another handle to an already retained listener.
    pub fn lend(&self, addr: SocketAddr) -> io::Result<Option<TcpListener>> {
        let retained = self.retained.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in retained.iter() {
            if listener.local_addr()? == addr {
                let clone = listener.try_clone()?;
                clone.set_nonblocking(true)?;
                return TcpListener::from_std(clone).map(Some);
            }
        }
        Ok(None)
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
