// SPDX-License-Identifier: GPL-2.0

//! Directory-entry cache.
//!
//! A dentry is an edge `(parent, name)` that may or may not resolve to an
//! inode; without one it is *negative* and records an unresolved name or a
//! proven non-existence. All dentries of a namespace live in one bucketed
//! hash table keyed by parent pointer, name hash and name bytes. Entries
//! whose refcount drops to zero while still hashed are parked on an LRU
//! list and reclaimed under memory pressure by [`DentryCache::shrink`].
//!
//! Refcount protocol: `d_count` counts active users (walkers, open files,
//! task anchors, mount roots) plus one reference per child, so a dentry
//! with children never reaches the LRU. Every 0↔1 transition of a hashed
//! entry happens under its hash-bucket lock, which is what makes a cache
//! hit and a concurrent reclaim unable to resurrect or double-free an
//! entry. Lock order: bucket → per-dentry → child list / alias list; the
//! LRU lock nests inside the bucket lock. No cache lock is ever held
//! across a back-end call.

use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::fs::fcontext::{Action, FsContext};
use crate::fs::inode::{iget, inode_permission, iput, AccessMode, Inode};
use crate::fs::mode::FileKind;
use crate::fs::qstr::Qstr;
use crate::fs::super_block::SuperBlock;
use crate::fs::Vfs;
use crate::sync::{Arc, SpinLock};

bitflags::bitflags! {
	/// Dentry state bits.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct DentryFlags: u32 {
		/// On the global hash table
		const HASHED       = 1 << 0;
		/// Parked on the LRU; implies refcount zero
		const IN_LRU       = 1 << 1;
		/// No inode attached
		const NEGATIVE     = 1 << 2;
		/// At least one mount is anchored here
		const MOUNTED      = 1 << 3;
		/// Touched since last reclaim scan
		const REFERENCED   = 1 << 4;
		/// Unlinked from the tree; reclaimed at last unref
		const DISCONNECTED = 1 << 5;
	}
}

struct DentryInner {
	name: Qstr,
	/// `None` for a filesystem root: the root is its own parent.
	parent: Option<Arc<Dentry>>,
	inode: Option<Arc<Inode>>,
}

/// A cached directory entry.
pub struct Dentry {
	/// Owning superblock
	pub d_sb: Arc<SuperBlock>,
	/// Identity and inode binding, under the per-dentry lock
	inner: SpinLock<DentryInner>,
	/// Children of this dentry (cache structure, not storage)
	d_children: SpinLock<Vec<Arc<Dentry>>>,
	d_flags: AtomicU32,
	d_count: AtomicU32,
	/// Last-access stamp from the cache clock, for LRU aging
	d_time: AtomicU64,
}

impl Dentry {
	fn new(sb: Arc<SuperBlock>, name: Qstr, parent: Option<Arc<Dentry>>, flags: DentryFlags) -> Dentry {
		Dentry {
			d_sb: sb,
			inner: SpinLock::new(DentryInner { name, parent, inode: None }),
			d_children: SpinLock::new(Vec::new()),
			d_flags: AtomicU32::new(flags.bits()),
			d_count: AtomicU32::new(1),
			d_time: AtomicU64::new(0),
		}
	}

	/// Current flag set.
	pub fn flags(&self) -> DentryFlags {
		DentryFlags::from_bits_truncate(self.d_flags.load(Ordering::Acquire))
	}

	pub fn set_flag(&self, f: DentryFlags) {
		self.d_flags.fetch_or(f.bits(), Ordering::AcqRel);
	}

	pub fn clear_flag(&self, f: DentryFlags) {
		self.d_flags.fetch_and(!f.bits(), Ordering::AcqRel);
	}

	pub fn has_flag(&self, f: DentryFlags) -> bool {
		self.flags().contains(f)
	}

	/// Current reference count.
	pub fn count(&self) -> u32 {
		self.d_count.load(Ordering::Acquire)
	}

	/// Component name (cloned; the stored name is immutable between renames).
	pub fn name(&self) -> Qstr {
		self.inner.lock().name.clone()
	}

	/// Parent dentry; `None` for a filesystem root.
	pub fn parent(&self) -> Option<Arc<Dentry>> {
		self.inner.lock().parent.clone()
	}

	/// Parent dentry, with the root resolving to itself.
	pub fn parent_or_self(self: &Arc<Dentry>) -> Arc<Dentry> {
		self.parent().unwrap_or_else(|| self.clone())
	}

	/// Attached inode, if positive.
	pub fn inode(&self) -> Option<Arc<Inode>> {
		self.inner.lock().inode.clone()
	}

	/// True when no inode is attached.
	pub fn is_negative(&self) -> bool {
		self.inner.lock().inode.is_none()
	}

	/// Object kind, for positive dentries.
	pub fn kind(&self) -> Option<FileKind> {
		self.inode().map(|i| i.kind())
	}

	pub fn is_dir(&self) -> bool {
		self.kind() == Some(FileKind::Directory)
	}

	pub fn is_symlink(&self) -> bool {
		self.kind() == Some(FileKind::Symlink)
	}

	pub fn is_regular(&self) -> bool {
		self.kind() == Some(FileKind::Regular)
	}

	/// True when a mount is anchored on this dentry.
	pub fn is_mountpoint(&self) -> bool {
		self.has_flag(DentryFlags::MOUNTED)
	}

	/// Number of cached children (for diagnostics and tests).
	pub fn cached_children(&self) -> usize {
		self.d_children.lock().len()
	}

	/// True while the parent's child list contains this dentry.
	pub fn is_reachable(self: &Arc<Dentry>) -> bool {
		match self.parent() {
			None => !self.has_flag(DentryFlags::DISCONNECTED),
			Some(p) => p.d_children.lock().iter().any(|c| Arc::ptr_eq(c, self)),
		}
	}
}

impl fmt::Debug for Dentry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"Dentry({:?}, count={}, flags={:?})",
			self.name().as_str(),
			self.count(),
			self.flags()
		)
	}
}

/// Take an additional reference on a dentry already held.
pub fn dget(d: &Arc<Dentry>) -> Arc<Dentry> {
	d.d_count.fetch_add(1, Ordering::AcqRel);
	d.clone()
}

/// Release a dentry reference. At zero the entry parks on the LRU while
/// hashed, or is reclaimed immediately once unhashed. Reclaim releases the
/// child reference on the parent, so a chain of last-unrefs walks upward.
pub fn dput(vfs: &Vfs, d: &Arc<Dentry>) {
	let cache = &vfs.dcache;
	let mut next = Some(d.clone());
	while let Some(d) = next.take() {
		let idx = cache.index_of(&d);
		let bucket = cache.buckets[idx].lock();
		let prev = d.d_count.fetch_sub(1, Ordering::AcqRel);
		debug_assert!(prev > 0, "dput on a dead dentry");
		if prev != 1 {
			continue;
		}
		if d.has_flag(DentryFlags::HASHED) {
			// Park on the LRU; still under the bucket lock so a racing
			// lookup cannot miss the transition.
			let mut lru = cache.lru.lock();
			lru.push(d.clone());
			d.set_flag(DentryFlags::IN_LRU);
		} else {
			drop(bucket);
			next = cache.reclaim(vfs, &d);
		}
	}
}

const DCACHE_BUCKETS: usize = 256;

/// The namespace-wide dentry table: hash buckets plus the LRU parking lot.
pub struct DentryCache {
	buckets: Vec<SpinLock<Vec<Arc<Dentry>>>>,
	lru: SpinLock<Vec<Arc<Dentry>>>,
	clock: AtomicU64,
	hashed: AtomicUsize,
}

impl DentryCache {
	pub fn new() -> DentryCache {
		let mut buckets = Vec::with_capacity(DCACHE_BUCKETS);
		for _ in 0..DCACHE_BUCKETS {
			buckets.push(SpinLock::new(Vec::new()));
		}
		DentryCache {
			buckets,
			lru: SpinLock::new(Vec::new()),
			clock: AtomicU64::new(0),
			hashed: AtomicUsize::new(0),
		}
	}

	fn key_index(parent_ptr: usize, name_hash: u32) -> usize {
		let mixed = (parent_ptr >> 4).wrapping_mul(31).wrapping_add(name_hash as usize);
		mixed % DCACHE_BUCKETS
	}

	/// Bucket a dentry currently belongs to, from its live identity.
	fn index_of(&self, d: &Arc<Dentry>) -> usize {
		let inner = d.inner.lock();
		let pptr = match &inner.parent {
			Some(p) => Arc::as_ptr(p) as usize,
			None => Arc::as_ptr(d) as usize,
		};
		Self::key_index(pptr, inner.name.hash())
	}

	fn matches(entry: &Arc<Dentry>, parent: &Arc<Dentry>, name: &Qstr) -> bool {
		let inner = entry.inner.lock();
		match &inner.parent {
			Some(p) => Arc::ptr_eq(p, parent) && inner.name.equals(name),
			None => false,
		}
	}

	/// Take a reference on a hashed entry found under its bucket lock,
	/// lifting it out of the LRU when it was parked there.
	fn grab_locked(&self, entry: &Arc<Dentry>) -> Arc<Dentry> {
		if entry.count() == 0 {
			let mut lru = self.lru.lock();
			if let Some(pos) = lru.iter().position(|x| Arc::ptr_eq(x, entry)) {
				lru.remove(pos);
			}
			entry.clear_flag(DentryFlags::IN_LRU);
			entry.d_count.store(1, Ordering::Release);
		} else {
			entry.d_count.fetch_add(1, Ordering::AcqRel);
		}
		entry.set_flag(DentryFlags::REFERENCED);
		entry
			.d_time
			.store(self.clock.fetch_add(1, Ordering::Relaxed) + 1, Ordering::Relaxed);
		entry.clone()
	}

	/// Probe the cache for `(parent, name)`. Returns the entry (positive or
	/// negative) with its refcount raised, or `None` on a miss. Never
	/// allocates.
	pub fn lookup(&self, parent: &Arc<Dentry>, name: &Qstr) -> Option<Arc<Dentry>> {
		let idx = Self::key_index(Arc::as_ptr(parent) as usize, name.hash());
		let bucket = self.buckets[idx].lock();
		for entry in bucket.iter() {
			if Self::matches(entry, parent, name) {
				return Some(self.grab_locked(entry));
			}
		}
		None
	}

	/// Create a negative dentry for `(parent, name)`, hash it, and link it
	/// into the parent's child list. Check-then-insert runs under the
	/// bucket lock, so at most one entry per key can exist; a raced
	/// insertion returns the existing entry instead.
	pub fn alloc(&self, parent: &Arc<Dentry>, name: &Qstr) -> Arc<Dentry> {
		let idx = Self::key_index(Arc::as_ptr(parent) as usize, name.hash());
		let d;
		{
			let mut bucket = self.buckets[idx].lock();
			for entry in bucket.iter() {
				if Self::matches(entry, parent, name) {
					return self.grab_locked(entry);
				}
			}
			d = Arc::new(Dentry::new(
				parent.d_sb.clone(),
				name.clone(),
				Some(dget(parent)),
				DentryFlags::HASHED | DentryFlags::NEGATIVE,
			));
			bucket.push(d.clone());
			self.hashed.fetch_add(1, Ordering::Relaxed);
		}
		parent.d_children.lock().push(d.clone());
		d
	}

	/// Create an unhashed, self-parented root dentry for a superblock.
	pub fn alloc_root(&self, sb: &Arc<SuperBlock>) -> Arc<Dentry> {
		Arc::new(Dentry::new(sb.clone(), Qstr::new("/"), None, DentryFlags::NEGATIVE))
	}

	/// Create an unhashed root-like dentry with a given name. Bind mounts
	/// use this for their distinct mount-root copy.
	pub fn alloc_anon(&self, sb: &Arc<SuperBlock>, name: &Qstr) -> Arc<Dentry> {
		Arc::new(Dentry::new(sb.clone(), name.clone(), None, DentryFlags::NEGATIVE))
	}

	/// Bind a dentry to an inode, adding it to the inode's alias list. A
	/// previous binding (rename-target path) is released first.
	pub fn instantiate(&self, vfs: &Vfs, dentry: &Arc<Dentry>, inode: &Arc<Inode>) {
		let old = {
			let mut inner = dentry.inner.lock();
			let old = inner.inode.take();
			if let Some(old) = &old {
				old.remove_alias(dentry);
			}
			iget(inode);
			inner.inode = Some(inode.clone());
			inode.add_alias(dentry);
			old
		};
		dentry.clear_flag(DentryFlags::NEGATIVE);
		if let Some(old) = old {
			iput(vfs, &old);
		}
	}

	/// Move `src` under `(new_parent, new_name)`: unhash, update parent
	/// linkage and name, rehash. The refcount and any open-file references
	/// to `src` are preserved. If another entry already occupies the new
	/// key the dentry is left unhashed and `Busy` is returned.
	pub fn rename(
		&self,
		vfs: &Vfs,
		src: &Arc<Dentry>,
		new_parent: &Arc<Dentry>,
		new_name: &Qstr,
	) -> Result<()> {
		if Arc::ptr_eq(src, new_parent) {
			return Err(Error::InvalidInput);
		}
		if src.parent().is_none() {
			// Filesystem roots do not move.
			return Err(Error::Busy);
		}

		// Drop the old hash linkage first.
		let old_idx = self.index_of(src);
		{
			let mut bucket = self.buckets[old_idx].lock();
			if let Some(pos) = bucket.iter().position(|x| Arc::ptr_eq(x, src)) {
				bucket.remove(pos);
				self.hashed.fetch_sub(1, Ordering::Relaxed);
			}
			src.clear_flag(DentryFlags::HASHED);
		}

		// Update identity under the per-dentry lock.
		let released_parent = {
			let mut inner = src.inner.lock();
			inner.name = new_name.clone();
			let moving = match &inner.parent {
				Some(p) => !Arc::ptr_eq(p, new_parent),
				None => false,
			};
			if moving {
				inner.parent.replace(dget(new_parent))
			} else {
				None
			}
		};

		// Child-list surgery; two list locks taken in address order.
		if let Some(old_parent) = &released_parent {
			let a = Arc::as_ptr(old_parent) as usize;
			let b = Arc::as_ptr(new_parent) as usize;
			if a < b {
				let mut oc = old_parent.d_children.lock();
				let mut nc = new_parent.d_children.lock();
				oc.retain(|x| !Arc::ptr_eq(x, src));
				nc.push(src.clone());
			} else {
				let mut nc = new_parent.d_children.lock();
				let mut oc = old_parent.d_children.lock();
				oc.retain(|x| !Arc::ptr_eq(x, src));
				nc.push(src.clone());
			}
		}

		// Rehash under the new key; duplicate keys refuse the insert.
		let new_idx = Self::key_index(Arc::as_ptr(new_parent) as usize, new_name.hash());
		let mut ret = Ok(());
		{
			let mut bucket = self.buckets[new_idx].lock();
			if bucket.iter().any(|e| Self::matches(e, new_parent, new_name)) {
				ret = Err(Error::Busy);
			} else {
				bucket.push(src.clone());
				src.set_flag(DentryFlags::HASHED);
				self.hashed.fetch_add(1, Ordering::Relaxed);
			}
		}

		if let Some(old_parent) = released_parent {
			dput(vfs, &old_parent);
		}
		ret
	}

	/// Detach a dentry from the tree: unhash it and remove it from the
	/// parent's child list. Does not free; reclaim happens at last unref.
	pub fn prune(&self, d: &Arc<Dentry>) {
		let idx = self.index_of(d);
		{
			let mut bucket = self.buckets[idx].lock();
			if let Some(pos) = bucket.iter().position(|x| Arc::ptr_eq(x, d)) {
				bucket.remove(pos);
				self.hashed.fetch_sub(1, Ordering::Relaxed);
			}
			d.clear_flag(DentryFlags::HASHED);
		}
		if let Some(parent) = d.parent() {
			parent.d_children.lock().retain(|x| !Arc::ptr_eq(x, d));
		}
		d.set_flag(DentryFlags::DISCONNECTED);
	}

	/// Unlink-style removal: drop one link on the inode (setting FREEING at
	/// zero) and detach the dentry. Works on open files too; the inode is
	/// evicted once the last handle goes away.
	pub fn delete(&self, d: &Arc<Dentry>) -> Result<()> {
		let inode = d.inode().ok_or(Error::NoSuchEntry)?;
		inode.drop_link();
		self.prune(d);
		Ok(())
	}

	/// Reclaim a refcount-zero, unhashed dentry: drop its LRU and list
	/// memberships, release the inode binding, and hand back the parent so
	/// the caller can release the child reference.
	fn reclaim(&self, vfs: &Vfs, d: &Arc<Dentry>) -> Option<Arc<Dentry>> {
		{
			let mut lru = self.lru.lock();
			if let Some(pos) = lru.iter().position(|x| Arc::ptr_eq(x, d)) {
				lru.remove(pos);
			}
			d.clear_flag(DentryFlags::IN_LRU);
		}
		let (parent, inode) = {
			let mut inner = d.inner.lock();
			(inner.parent.take(), inner.inode.take())
		};
		if let Some(p) = &parent {
			p.d_children.lock().retain(|x| !Arc::ptr_eq(x, d));
		}
		if let Some(i) = inode {
			i.remove_alias(d);
			iput(vfs, &i);
		}
		d.set_flag(DentryFlags::DISCONNECTED);
		parent
	}

	/// Free up to `count` entries from the LRU head; zero means all.
	/// Returns the number reclaimed.
	pub fn shrink(&self, vfs: &Vfs, count: usize) -> usize {
		let target = if count == 0 { usize::MAX } else { count };
		let mut freed = 0usize;
		while freed < target {
			let cand = self.lru.lock().first().cloned();
			let Some(d) = cand else { break };
			let idx = self.index_of(&d);
			{
				let mut bucket = self.buckets[idx].lock();
				let mut lru = self.lru.lock();
				// A concurrent lookup may have lifted the head already.
				match lru.first() {
					Some(head) if Arc::ptr_eq(head, &d) => {}
					_ => continue,
				}
				debug_assert_eq!(d.count(), 0, "LRU entry with live references");
				lru.remove(0);
				d.clear_flag(DentryFlags::IN_LRU);
				if let Some(pos) = bucket.iter().position(|x| Arc::ptr_eq(x, &d)) {
					bucket.remove(pos);
					self.hashed.fetch_sub(1, Ordering::Relaxed);
				}
				d.clear_flag(DentryFlags::HASHED);
			}
			if let Some(parent) = self.reclaim(vfs, &d) {
				dput(vfs, &parent);
			}
			freed += 1;
		}
		if freed > 0 {
			log::trace!("dcache: reclaimed {} entries", freed);
		}
		freed
	}

	/// Detach every cached entry belonging to `sb`. Used by superblock
	/// teardown after the last mount and file are gone.
	pub fn prune_superblock(&self, vfs: &Vfs, sb: &Arc<SuperBlock>) {
		let mut victims = Vec::new();
		for bucket in &self.buckets {
			let b = bucket.lock();
			for e in b.iter() {
				if Arc::ptr_eq(&e.d_sb, sb) {
					victims.push(e.clone());
				}
			}
		}
		for d in &victims {
			self.prune(d);
		}
		// Entries parked on the LRU are unreachable now; sweep them.
		for d in victims {
			let on_lru = {
				let mut lru = self.lru.lock();
				match lru.iter().position(|x| Arc::ptr_eq(x, &d)) {
					Some(pos) => {
						lru.remove(pos);
						d.clear_flag(DentryFlags::IN_LRU);
						true
					}
					None => false,
				}
			};
			if on_lru {
				if let Some(parent) = self.reclaim(vfs, &d) {
					dput(vfs, &parent);
				}
			}
		}
	}

	/// Number of hashed entries.
	pub fn hashed_len(&self) -> usize {
		self.hashed.load(Ordering::Relaxed)
	}

	/// Number of entries parked on the LRU.
	pub fn lru_len(&self) -> usize {
		self.lru.lock().len()
	}
}

impl Default for DentryCache {
	fn default() -> Self {
		Self::new()
	}
}

/// Dentry-layer intent dispatcher. One action is answered here: component
/// lookup for the path walker. The cache is probed first; a miss allocates
/// a negative entry and leaves population to the caller.
pub fn dentry_dispatch(fctx: &mut FsContext<'_>) -> Result<()> {
	match fctx.fc_action {
		Action::Lookup => dentry_lookup_intent(fctx),
		_ => Err(Error::NotImplemented),
	}
}

fn dentry_lookup_intent(fctx: &mut FsContext<'_>) -> Result<()> {
	let parent = fctx.current_dentry()?;
	let pinode = parent.inode().ok_or(Error::NoSuchEntry)?;
	if !parent.is_dir() {
		return Err(Error::NotDirectory);
	}
	// Search permission applies per component, cached or not.
	inode_permission(&pinode, AccessMode::EXEC, fctx.uid(), fctx.gid())?;
	let name = fctx.fc_name.clone().ok_or(Error::InvalidInput)?;
	let cache = &fctx.vfs.dcache;
	let child = match cache.lookup(&parent, &name) {
		Some(d) => d,
		None => cache.alloc(&parent, &name),
	};
	fctx.replace_dentry(child);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::inode::inode_alloc;
	use crate::fs::mode;
	use crate::fs::testutil::nullfs_sb;

	fn rooted_cache() -> (Vfs, Arc<SuperBlock>, Arc<Dentry>) {
		let vfs = Vfs::new();
		let sb = nullfs_sb();
		let root = vfs.dcache.alloc_root(&sb);
		let root_inode = inode_alloc(&sb, mode::S_IFDIR | 0o755);
		vfs.dcache.instantiate(&vfs, &root, &root_inode);
		iput(&vfs, &root_inode);
		(vfs, sb, root)
	}

	fn mkdir_at(vfs: &Vfs, sb: &Arc<SuperBlock>, parent: &Arc<Dentry>, name: &str) -> Arc<Dentry> {
		let d = vfs.dcache.alloc(parent, &Qstr::new(name));
		let inode = inode_alloc(sb, mode::S_IFDIR | 0o755);
		vfs.dcache.instantiate(vfs, &d, &inode);
		iput(vfs, &inode);
		d
	}

	#[test]
	fn alloc_then_unref_returns_cache_to_prior_state() {
		let (vfs, _sb, root) = rooted_cache();
		let baseline = vfs.dcache.hashed_len();
		let d = vfs.dcache.alloc(&root, &Qstr::new("a"));
		assert!(d.is_negative());
		assert_eq!(vfs.dcache.hashed_len(), baseline + 1);
		dput(&vfs, &d);
		assert_eq!(vfs.dcache.lru_len(), 1);
		assert_eq!(vfs.dcache.shrink(&vfs, 0), 1);
		assert_eq!(vfs.dcache.hashed_len(), baseline);
		assert_eq!(vfs.dcache.lru_len(), 0);
	}

	#[test]
	fn lookup_lifts_from_lru_preserving_identity() {
		let (vfs, sb, root) = rooted_cache();
		let d = mkdir_at(&vfs, &sb, &root, "kept");
		let ptr = Arc::as_ptr(&d) as usize;
		dput(&vfs, &d);
		drop(d);
		assert_eq!(vfs.dcache.lru_len(), 1);

		let found = vfs.dcache.lookup(&root, &Qstr::new("kept")).unwrap();
		assert_eq!(Arc::as_ptr(&found) as usize, ptr);
		assert_eq!(found.count(), 1);
		assert!(!found.has_flag(DentryFlags::IN_LRU));
		assert!(found.has_flag(DentryFlags::REFERENCED));
		assert_eq!(vfs.dcache.lru_len(), 0);
		dput(&vfs, &found);
	}

	#[test]
	fn lru_and_refcount_are_mutually_exclusive() {
		let (vfs, _sb, root) = rooted_cache();
		let d = vfs.dcache.alloc(&root, &Qstr::new("x"));
		assert!(d.count() > 0);
		assert!(!d.has_flag(DentryFlags::IN_LRU));
		dput(&vfs, &d);
		assert_eq!(d.count(), 0);
		assert!(d.has_flag(DentryFlags::IN_LRU));
	}

	#[test]
	fn double_alloc_returns_single_negative_entry() {
		let (vfs, _sb, root) = rooted_cache();
		let a = vfs.dcache.alloc(&root, &Qstr::new("new"));
		let b = vfs.dcache.alloc(&root, &Qstr::new("new"));
		assert!(Arc::ptr_eq(&a, &b));
		assert_eq!(a.count(), 2);
		dput(&vfs, &a);
		dput(&vfs, &b);
	}

	#[test]
	fn hash_probe_matches_parent_and_bytes() {
		let (vfs, sb, root) = rooted_cache();
		let dir = mkdir_at(&vfs, &sb, &root, "dir");
		let _child = mkdir_at(&vfs, &sb, &dir, "name");
		assert!(vfs.dcache.lookup(&dir, &Qstr::new("name")).is_some());
		assert!(vfs.dcache.lookup(&root, &Qstr::new("name")).is_none());
		assert!(vfs.dcache.lookup(&dir, &Qstr::new("nam")).is_none());
	}

	#[test]
	fn instantiate_adds_alias_and_clears_negative() {
		let (vfs, sb, root) = rooted_cache();
		let d = vfs.dcache.alloc(&root, &Qstr::new("f"));
		assert!(d.is_negative());
		let inode = inode_alloc(&sb, mode::S_IFREG | 0o644);
		vfs.dcache.instantiate(&vfs, &d, &inode);
		assert!(!d.is_negative());
		assert!(inode.has_alias(&d));
		iput(&vfs, &inode);
	}

	#[test]
	fn rename_roundtrip_restores_cache_state() {
		let (vfs, sb, root) = rooted_cache();
		let x = mkdir_at(&vfs, &sb, &root, "x");
		let y = mkdir_at(&vfs, &sb, &root, "y");
		let f = mkdir_at(&vfs, &sb, &x, "f");
		let ino = f.inode().unwrap().i_ino;
		let count_before = f.count();

		vfs.dcache.rename(&vfs, &f, &y, &Qstr::new("g")).unwrap();
		assert!(vfs.dcache.lookup(&x, &Qstr::new("f")).is_none());
		let g = vfs.dcache.lookup(&y, &Qstr::new("g")).unwrap();
		assert!(Arc::ptr_eq(&g, &f));
		assert_eq!(g.inode().unwrap().i_ino, ino);
		dput(&vfs, &g);

		vfs.dcache.rename(&vfs, &f, &x, &Qstr::new("f")).unwrap();
		assert!(vfs.dcache.lookup(&y, &Qstr::new("g")).is_none());
		let back = vfs.dcache.lookup(&x, &Qstr::new("f")).unwrap();
		assert!(Arc::ptr_eq(&back, &f));
		assert!(f.is_reachable());
		assert!(f.inode().unwrap().has_alias(&f));
		dput(&vfs, &back);
		assert_eq!(f.count(), count_before);
	}

	#[test]
	fn rename_onto_occupied_key_reports_busy_and_unhashes() {
		let (vfs, sb, root) = rooted_cache();
		let a = mkdir_at(&vfs, &sb, &root, "a");
		let _b = mkdir_at(&vfs, &sb, &root, "b");
		let err = vfs.dcache.rename(&vfs, &a, &root, &Qstr::new("b")).unwrap_err();
		assert_eq!(err, Error::Busy);
		assert!(!a.has_flag(DentryFlags::HASHED));
	}

	#[test]
	fn prune_disconnects_from_parent_list() {
		let (vfs, sb, root) = rooted_cache();
		let d = mkdir_at(&vfs, &sb, &root, "gone");
		assert!(d.is_reachable());
		vfs.dcache.prune(&d);
		assert!(!d.is_reachable());
		assert!(d.has_flag(DentryFlags::DISCONNECTED));
		assert!(vfs.dcache.lookup(&root, &Qstr::new("gone")).is_none());
		dput(&vfs, &d);
	}

	#[test]
	fn parent_with_children_never_enters_lru() {
		let (vfs, sb, root) = rooted_cache();
		let dir = mkdir_at(&vfs, &sb, &root, "dir");
		let child = vfs.dcache.alloc(&dir, &Qstr::new("leaf"));
		dput(&vfs, &dir);
		// The child still pins the parent: count reflects the child ref.
		assert!(dir.count() > 0);
		assert!(!dir.has_flag(DentryFlags::IN_LRU));
		dput(&vfs, &child);
	}

	#[test]
	fn shrink_respects_count_and_cascades_parent_release() {
		let (vfs, sb, root) = rooted_cache();
		for i in 0..10 {
			let name = alloc::format!("n{}", i);
			let d = mkdir_at(&vfs, &sb, &root, &name);
			dput(&vfs, &d);
		}
		assert_eq!(vfs.dcache.lru_len(), 10);
		assert_eq!(vfs.dcache.shrink(&vfs, 4), 4);
		assert_eq!(vfs.dcache.lru_len(), 6);
		assert_eq!(vfs.dcache.shrink(&vfs, 0), 6);
		assert_eq!(vfs.dcache.lru_len(), 0);
	}
}
