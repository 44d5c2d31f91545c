//! Write locks, RFC 4918 sections 6 and 7.
//!
//! Locks live in memory, keyed by the path of the resource they were
//! granted on. Expiry is lazy: expired entries are ignored everywhere
//! and physically removed by a purge that runs at most once per
//! interval, piggybacked on regular registry calls.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::error::{LockError, ParsingError};
use super::types::{
    ActiveLock, Depth, Href, LockEntry, LockRoot, LockScope, LockToken, LockType, Owner, Timeout,
};

const TOKEN_SCHEME: &str = "opaquelocktoken:";
const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// How a resource finds the resource above it. The root has no parent.
pub trait ParentChain {
    fn parent_of(&self, path: &str) -> Option<String>;
}

/// One granted lock.
#[derive(Debug, Clone)]
pub struct Lock {
    token: String,
    locktype: LockType,
    scope: LockScope,
    depth: Depth,
    owner: Option<Owner>,
    timeout: Timeout,
    granted: Instant,
    root: Option<String>,
}

impl Lock {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn scope(&self) -> LockScope {
        self.scope
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    /// The path the lock was granted on, set at registration.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    fn is_live(&self, now: Instant) -> bool {
        match self.timeout.validity(self.granted) {
            None => true,
            Some(deadline) => deadline > now,
        }
    }

    /// The lockdiscovery rendition, with the timeout counted down to
    /// what remains.
    pub fn active_lock(&self, now: Instant) -> ActiveLock {
        ActiveLock {
            lockscope: self.scope,
            locktype: self.locktype,
            depth: self.depth,
            owner: self.owner.clone(),
            timeout: Some(self.timeout.remaining(self.granted, now)),
            locktoken: Some(LockToken(Href(self.token.clone()))),
            lockroot: LockRoot(Href(self.root.clone().unwrap_or_default())),
        }
    }
}

#[derive(Debug)]
struct Inner {
    locks: HashMap<String, Vec<Lock>>,
    last_purge: Instant,
}

/// All locks held by a server instance.
#[derive(Debug)]
pub struct LockRegistry {
    inner: Mutex<Inner>,
    min_purge_interval: Duration,
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::with_purge_interval(DEFAULT_PURGE_INTERVAL)
    }

    pub fn with_purge_interval(min_purge_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                locks: HashMap::new(),
                last_purge: Instant::now(),
            }),
            min_purge_interval,
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mint a lock with a fresh opaquelocktoken. The lock holds nothing
    /// until registered with [`Self::lock`].
    pub fn create(
        &self,
        locktype: LockType,
        scope: LockScope,
        owner: Option<Owner>,
        timeout: Timeout,
        depth: Depth,
    ) -> Lock {
        Lock {
            token: format!("{}{}", TOKEN_SCHEME, uuid_like(rand::random::<u128>())),
            locktype,
            scope,
            depth,
            owner,
            timeout,
            granted: Instant::now(),
            root: None,
        }
    }

    /// Register `lock` on `path`. Checked and applied under a single
    /// registry lock, so two conflicting grants cannot interleave.
    pub fn lock(&self, mut lock: Lock, path: &str) -> Result<(), LockError> {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        self.maybe_purge(&mut inner, now);

        let held: Vec<&Lock> = inner
            .locks
            .get(path)
            .map(|locks| locks.iter().filter(|l| l.is_live(now)).collect())
            .unwrap_or_default();

        let conflicting = held
            .iter()
            .any(|h| h.scope == LockScope::Exclusive)
            || (lock.scope == LockScope::Exclusive && !held.is_empty());
        if conflicting {
            let roots: Vec<String> = held
                .iter()
                .map(|h| h.root.clone().unwrap_or_else(|| path.to_string()))
                .collect();
            warn!(path, held = roots.len(), "lock refused, conflicting lock held");
            return Err(LockError::Conflict(roots));
        }

        debug!(path, token = lock.token.as_str(), "lock granted");
        lock.granted = now;
        lock.root = Some(path.to_string());
        inner.locks.entry(path.to_string()).or_default().push(lock);
        Ok(())
    }

    /// Remove the lock `token` holds on `path`. Returns whether
    /// anything was removed, so a second identical call yields false.
    pub fn unlock(&self, path: &str, token: &str) -> bool {
        let mut inner = self.lock_inner();
        let (removed, emptied) = match inner.locks.get_mut(path) {
            None => (false, false),
            Some(locks) => {
                let before = locks.len();
                locks.retain(|l| l.token != token);
                (locks.len() < before, locks.is_empty())
            }
        };
        if emptied {
            inner.locks.remove(path);
        }
        if removed {
            debug!(path, token, "lock released");
        }
        removed
    }

    /// Whether `token` may modify `path`. A lock protects `path` when
    /// it sits on `path` itself or on an ancestor whose depth reaches
    /// down this far: infinity from any height, one from the direct
    /// parent, zero never. Access needs the token of one protecting
    /// lock; the whole chain is scanned, so a shallow lock partway up
    /// never hides a deeper ancestor's. With no protecting lock the
    /// resource is free.
    pub fn is_access_allowed(
        &self,
        chain: &impl ParentChain,
        path: &str,
        token: Option<&str>,
    ) -> bool {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        self.maybe_purge(&mut inner, now);

        let live = |inner: &Inner, p: &str| -> Vec<Lock> {
            inner
                .locks
                .get(p)
                .map(|locks| locks.iter().filter(|l| l.is_live(now)).cloned().collect())
                .unwrap_or_default()
        };

        let mut protecting = live(&inner, path);
        let mut hops = 1;
        let mut cursor = path.to_string();
        while let Some(parent) = chain.parent_of(&cursor) {
            protecting.extend(live(&inner, &parent).into_iter().filter(|l| match l.depth {
                Depth::Infinity => true,
                Depth::One => hops == 1,
                Depth::Zero => false,
            }));
            cursor = parent;
            hops += 1;
        }

        if protecting.is_empty() {
            return true;
        }
        match token {
            None => false,
            Some(t) => protecting.iter().any(|l| l.token == t),
        }
    }

    /// Live locks granted directly on `path`.
    pub fn locks_on(&self, path: &str) -> Vec<Lock> {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        self.maybe_purge(&mut inner, now);
        inner
            .locks
            .get(path)
            .map(|locks| locks.iter().filter(|l| l.is_live(now)).cloned().collect())
            .unwrap_or_default()
    }

    /// The lockdiscovery value for `path`.
    pub fn discovery(&self, path: &str) -> Vec<ActiveLock> {
        let now = Instant::now();
        self.locks_on(path)
            .iter()
            .map(|l| l.active_lock(now))
            .collect()
    }

    /// The supportedlock value, identical for every resource.
    pub fn supported_lock(&self) -> Vec<LockEntry> {
        vec![
            LockEntry {
                lockscope: LockScope::Exclusive,
                locktype: LockType::Write,
            },
            LockEntry {
                lockscope: LockScope::Shared,
                locktype: LockType::Write,
            },
        ]
    }

    fn maybe_purge(&self, inner: &mut Inner, now: Instant) {
        if now.duration_since(inner.last_purge) < self.min_purge_interval {
            return;
        }
        inner.last_purge = now;
        let before: usize = inner.locks.values().map(Vec::len).sum();
        inner.locks.retain(|_, locks| {
            locks.retain(|l| l.is_live(now));
            !locks.is_empty()
        });
        let after: usize = inner.locks.values().map(Vec::len).sum();
        if after < before {
            debug!(expired = before - after, "purged expired locks");
        }
    }
}

/// Parse a `Lock-Token:` request header, a coded URL with or without
/// the list parentheses some clients keep from the `If` syntax.
pub fn parse_lock_token_header(raw: &str) -> Result<String, ParsingError> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .map(str::trim)
        .unwrap_or(trimmed);
    trimmed
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or(ParsingError::InvalidValue)
}

fn uuid_like(bits: u128) -> String {
    let hex = format!("{:032x}", bits);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    )
}
