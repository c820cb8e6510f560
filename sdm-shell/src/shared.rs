// SPDX-License-Identifier: GPL-3.0-only

//! Lazily opened shell session shared through leases
//!
//! The first caller opens the session; concurrent callers wait on the same
//! opening and all observe its outcome. When the last lease is released the
//! session is closed, and the next acquisition opens a fresh one. A session
//! whose process exited is replaced the same way. Cancelling the scope token
//! kills the session and fails every later call with
//! [`ShellError::Cancelled`]. An opening still in flight at that point is
//! dropped along with the process it spawned.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, ShellError};
use crate::launcher::ShellLauncher;
use crate::session::ShellSession;

type OpenFuture = BoxFuture<'static, Result<Arc<ShellSession>>>;
type Opener = Arc<dyn Fn() -> OpenFuture + Send + Sync>;

#[derive(Clone)]
pub struct SharedShell {
    inner: Arc<Inner>,
}

struct Inner {
    tag: String,
    opener: Opener,
    scope: CancellationToken,
    state: Mutex<State>,
}

struct State {
    slot: Slot,
    generation: u64,
    scope_watched: bool,
    /// Adopted shells with the keep-alive lease this shell holds on them
    children: Vec<(SharedShell, ShellLease)>,
}

enum Slot {
    Idle,
    Opening {
        generation: u64,
        future: Shared<OpenFuture>,
    },
    Open {
        session: Arc<ShellSession>,
        leases: usize,
    },
}

/// Keeps the shared session open until dropped
pub struct ShellLease {
    session: Arc<ShellSession>,
    shell: Arc<Inner>,
}

impl ShellLease {
    pub fn session(&self) -> &Arc<ShellSession> {
        &self.session
    }
}

impl std::ops::Deref for ShellLease {
    type Target = ShellSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl Drop for ShellLease {
    fn drop(&mut self) {
        self.shell.release(&self.session);
    }
}

impl SharedShell {
    pub fn new(tag: impl Into<String>, launcher: ShellLauncher, scope: CancellationToken) -> Self {
        Self::with_opener(tag, scope, move || {
            let launcher = launcher.clone();
            async move { ShellSession::open(launcher).await.map(Arc::new) }.boxed()
        })
    }

    /// Shared shell around a custom opening procedure
    pub fn with_opener<F>(tag: impl Into<String>, scope: CancellationToken, opener: F) -> Self
    where
        F: Fn() -> OpenFuture + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                tag: tag.into(),
                opener: Arc::new(opener),
                scope,
                state: Mutex::new(State {
                    slot: Slot::Idle,
                    generation: 0,
                    scope_watched: false,
                    children: Vec::new(),
                }),
            }),
        }
    }

    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    /// Acquires a lease on the live session, opening one if needed
    pub async fn get(&self) -> Result<ShellLease> {
        self.inner.acquire().await
    }

    /// Holds the session open across otherwise independent calls
    pub async fn keep_alive(&self) -> Result<ShellLease> {
        self.get().await
    }

    /// Runs `block` with the live session, releasing the lease afterwards
    pub async fn use_res<T, F, Fut>(&self, block: F) -> Result<T>
    where
        F: FnOnce(Arc<ShellSession>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lease = self.get().await?;
        let result = tokio::select! {
            biased;
            _ = self.inner.scope.cancelled() => Err(ShellError::Cancelled),
            result = block(lease.session().clone()) => result,
        };
        drop(lease);
        result
    }

    /// Ties `child` to this shell
    ///
    /// The child is kept open for as long as this shell's current session
    /// lives and is closed together with it. Adopting into a shell that is
    /// not open closes the child right away.
    pub async fn adopt_child(&self, child: SharedShell) -> Result<()> {
        if !self.is_open() {
            debug!("{}: not open, closing adopted {}", self.tag(), child.tag());
            child.close().await;
            return Ok(());
        }
        if self.inner.has_child(&child) {
            return Ok(());
        }

        let lease = child.keep_alive().await?;
        let mut state = self.inner.lock();
        if !matches!(state.slot, Slot::Open { .. }) {
            drop(state);
            drop(lease);
            debug!("{}: closed while {} opened", self.tag(), child.tag());
            child.close().await;
            return Ok(());
        }
        if !state
            .children
            .iter()
            .any(|(adopted, _)| Arc::ptr_eq(&adopted.inner, &child.inner))
        {
            state.children.push((child, lease));
        }
        Ok(())
    }

    /// Tears down the current session; outstanding leases start failing
    pub async fn close(&self) {
        if let Some(session) = self.inner.teardown() {
            session.close().await;
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(&self.inner.lock().slot, Slot::Open { session, .. } if session.is_alive())
    }

    #[cfg(test)]
    fn is_opening(&self) -> bool {
        matches!(self.inner.lock().slot, Slot::Opening { .. })
    }

    #[cfg(test)]
    fn lease_count(&self) -> usize {
        match self.inner.lock().slot {
            Slot::Open { leases, .. } => leases,
            _ => 0,
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panicking holder; keep using it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn acquire(self: &Arc<Self>) -> Result<ShellLease> {
        if self.scope.is_cancelled() {
            return Err(ShellError::Cancelled);
        }

        let (generation, future) = {
            let mut state = self.lock();
            if !state.scope_watched {
                state.scope_watched = true;
                self.watch_scope();
            }
            match &mut state.slot {
                Slot::Open { session, leases } if session.is_alive() => {
                    *leases += 1;
                    return Ok(self.lease(session.clone()));
                }
                Slot::Opening { generation, future } => (*generation, future.clone()),
                slot => {
                    if let Slot::Open { session, .. } = slot {
                        session.cancel();
                        debug!(
                            "{}: session {} is gone (exit code {:?}), reopening",
                            self.tag,
                            session.id(),
                            session.exit_code()
                        );
                    }
                    state.generation += 1;
                    let generation = state.generation;
                    let future = (self.opener)().shared();
                    state.slot = Slot::Opening {
                        generation,
                        future: future.clone(),
                    };
                    (generation, future)
                }
            }
        };

        let opened = tokio::select! {
            opened = future => opened,
            _ = self.scope.cancelled() => {
                self.abandon_opening(generation);
                return Err(ShellError::Cancelled);
            }
        };

        let mut state = self.lock();
        match opened {
            Ok(session) => {
                let adopt = matches!(
                    &state.slot,
                    Slot::Opening { generation: current, .. } if *current == generation
                );
                if adopt {
                    state.slot = Slot::Open {
                        session: session.clone(),
                        leases: 1,
                    };
                } else {
                    match &mut state.slot {
                        Slot::Open {
                            session: current,
                            leases,
                        } if Arc::ptr_eq(current, &session) => *leases += 1,
                        _ => {
                            // Closed while opening.
                            session.cancel();
                            return Err(ShellError::Closed);
                        }
                    }
                }
                Ok(self.lease(session))
            }
            Err(e) => {
                let pending = matches!(
                    &state.slot,
                    Slot::Opening { generation: current, .. } if *current == generation
                );
                if pending {
                    warn!("{}: failed to open shell: {}", self.tag, e);
                    state.slot = Slot::Idle;
                }
                Err(e)
            }
        }
    }

    fn lease(self: &Arc<Self>, session: Arc<ShellSession>) -> ShellLease {
        ShellLease {
            session,
            shell: self.clone(),
        }
    }

    fn has_child(&self, child: &SharedShell) -> bool {
        self.lock()
            .children
            .iter()
            .any(|(adopted, _)| Arc::ptr_eq(&adopted.inner, &child.inner))
    }

    /// Tears the shell down once the scope is cancelled
    fn watch_scope(self: &Arc<Self>) {
        let scope = self.scope.clone();
        let shell: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            scope.cancelled().await;
            if let Some(shell) = shell.upgrade() {
                if let Some(session) = shell.teardown() {
                    debug!("{}: scope cancelled, killing {}", shell.tag, session.id());
                    session.cancel();
                }
            }
        });
    }

    /// Drops the pending opening of `generation`, killing whatever it spawned
    fn abandon_opening(&self, generation: u64) {
        let mut state = self.lock();
        let pending = matches!(
            &state.slot,
            Slot::Opening { generation: current, .. } if *current == generation
        );
        if pending {
            let abandoned = std::mem::replace(&mut state.slot, Slot::Idle);
            drop(state);
            debug!("{}: scope cancelled while opening", self.tag);
            drop(abandoned);
        }
    }

    fn release(&self, released: &Arc<ShellSession>) {
        let mut state = self.lock();
        let last = match &mut state.slot {
            Slot::Open { session, leases } if Arc::ptr_eq(session, released) => {
                *leases = leases.saturating_sub(1);
                *leases == 0
            }
            // Lease on a session that was already torn down.
            _ => false,
        };
        drop(state);

        if !last {
            return;
        }
        if let Some(session) = self.teardown() {
            debug!("{}: last lease released, closing {}", self.tag, session.id());
            spawn_close(session);
        }
    }

    /// Detaches the current session and closes adopted children
    fn teardown(&self) -> Option<Arc<ShellSession>> {
        let (session, children) = {
            let mut state = self.lock();
            let slot = std::mem::replace(&mut state.slot, Slot::Idle);
            let children = std::mem::take(&mut state.children);
            match slot {
                Slot::Open { session, .. } => (Some(session), children),
                _ => (None, children),
            }
        };

        for (child, lease) in children {
            drop(lease);
            if let Some(session) = child.inner.teardown() {
                spawn_close(session);
            }
        }
        session
    }
}

fn spawn_close(session: Arc<ShellSession>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { session.close().await });
        }
        Err(_) => session.cancel(),
    }
}
