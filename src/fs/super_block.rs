// SPDX-License-Identifier: GPL-2.0

//! Superblocks, filesystem types, and the superblock-layer dispatcher.
//!
//! One superblock exists per mounted filesystem instance. It owns the
//! inode lists ({all} plus the {clean, dirty, under-IO} state lists,
//! the latter three under one state lock) and pins its root dentry. The
//! refcount counts live mounts plus open files plus the pinned root;
//! when only the pin remains and no mount is left the superblock is torn
//! down through the back-end's PutSuper.
//!
//! A back-end is a [`FilesystemType`]: a named descriptor with one
//! dispatch function. The registry lists back-ends by unique name.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::fs::dentry::{dput, Dentry};
use crate::fs::fcontext::{Action, FsContext};
use crate::fs::inode::{evict, write_back, Inode, InodeState};
use crate::fs::mount::VfsMount;
use crate::fs::Vfs;
use crate::sync::{Arc, SpinLock, Weak};

bitflags::bitflags! {
	/// Static filesystem-type flags.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct FsFlags: u32 {
		/// Needs a backing block device
		const REQUIRES_DEV     = 0x01;
		/// Mount data is binary, not text
		const BINARY_MOUNTDATA = 0x02;
		/// Subtype field is meaningful
		const HAS_SUBTYPE      = 0x04;
		/// Mountable inside a user namespace
		const USERNS_MOUNT     = 0x08;
		/// Back-end performs the dentry move on rename itself
		const RENAME_DOES_MOVE = 0x20;
	}
}

bitflags::bitflags! {
	/// Per-superblock capabilities.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct FsCapabilities: u32 {
		/// Names compare case-insensitively
		const CASE_INSENSITIVE = 0x01;
		/// Rename is atomic on the backing store
		const ATOMIC_RENAME    = 0x02;
	}
}

/// Mount flags, POSIX-style plus internal bits.
pub const MS_RDONLY: u32 = 1;
pub const MS_NOSUID: u32 = 2;
pub const MS_NODEV: u32 = 4;
pub const MS_NOEXEC: u32 = 8;
pub const MS_SYNCHRONOUS: u32 = 16;
pub const MS_MANDLOCK: u32 = 64;
pub const MS_NOATIME: u32 = 1024;
pub const MS_NODIRATIME: u32 = 2048;
pub const MS_BIND: u32 = 4096;
pub const MS_RELATIME: u32 = 1 << 21;
/// Internal: this superblock backs the global root mount.
pub const MS_ROOTFS: u32 = 1 << 28;

/// A registered back-end: a static descriptor plus one dispatch function
/// that answers the actions of the back-end table.
///
/// If a back-end returns `NotImplemented` for an optional action the
/// caller treats it as a success no-op where the verb permits (sync on a
/// memory-only filesystem) and surfaces it otherwise.
pub trait FilesystemType: Send + Sync {
	/// Unique registry name.
	fn name(&self) -> &'static str;

	/// Static type flags.
	fn fs_flags(&self) -> FsFlags {
		FsFlags::empty()
	}

	/// Capabilities granted to superblocks of this type.
	fn capabilities(&self) -> FsCapabilities {
		FsCapabilities::empty()
	}

	/// The single dispatch entry point.
	fn handle(&self, fctx: &mut FsContext<'_>) -> Result<()>;
}

impl core::fmt::Debug for dyn FilesystemType {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("FilesystemType").field("name", &self.name()).finish()
	}
}

struct StateLists {
	clean: Vec<Arc<Inode>>,
	dirty: Vec<Arc<Inode>>,
	io: Vec<Arc<Inode>>,
}

/// In-memory handle for one mounted filesystem instance.
pub struct SuperBlock {
	/// Owning filesystem type
	pub s_fstype: Arc<dyn FilesystemType>,
	/// Device identifier; 0 for virtual filesystems
	pub s_device_id: u64,
	/// Magic number identifying the filesystem
	pub s_magic: u32,
	pub s_blocksize: u64,
	pub s_blocksize_bits: u32,
	pub s_file_maxbytes: u64,
	/// Timestamp granularity in nanoseconds
	pub s_time_granularity: u64,
	pub s_flags: AtomicU32,
	pub s_capabilities: FsCapabilities,
	/// Pinned root dentry
	pub s_root: SpinLock<Option<Arc<Dentry>>>,
	/// Mounts + open files + the root pin
	s_count: AtomicU32,
	s_ninodes: AtomicU32,
	s_next_ino: AtomicU64,
	/// Logical clock backing inode timestamps
	s_clock: AtomicU64,
	/// Every inode of this superblock
	s_all: SpinLock<Vec<Arc<Inode>>>,
	/// State lists; an inode is on exactly one at any time
	s_state: SpinLock<StateLists>,
	/// Mounts exposing this superblock (back-references)
	s_mounts: SpinLock<Vec<Weak<VfsMount>>>,
}

impl SuperBlock {
	/// Allocate a superblock shell with the usual defaults.
	pub fn new(fstype: Arc<dyn FilesystemType>, magic: u32, device_id: u64) -> Arc<SuperBlock> {
		let capabilities = fstype.capabilities();
		Arc::new(SuperBlock {
			s_fstype: fstype,
			s_device_id: device_id,
			s_magic: magic,
			s_blocksize: 4096,
			s_blocksize_bits: 12,
			s_file_maxbytes: i64::MAX as u64,
			s_time_granularity: 1,
			s_flags: AtomicU32::new(0),
			s_capabilities: capabilities,
			s_root: SpinLock::new(None),
			s_count: AtomicU32::new(1),
			s_ninodes: AtomicU32::new(0),
			s_next_ino: AtomicU64::new(1),
			s_clock: AtomicU64::new(1),
			s_all: SpinLock::new(Vec::new()),
			s_state: SpinLock::new(StateLists {
				clean: Vec::new(),
				dirty: Vec::new(),
				io: Vec::new(),
			}),
			s_mounts: SpinLock::new(Vec::new()),
		})
	}

	/// Advance and read the superblock clock.
	pub fn tick(&self) -> u64 {
		self.s_clock.fetch_add(1, Ordering::Relaxed)
	}

	/// Hand out the next inode number.
	pub fn next_ino(&self) -> u64 {
		self.s_next_ino.fetch_add(1, Ordering::Relaxed)
	}

	/// Number of live inodes.
	pub fn ninodes(&self) -> u32 {
		self.s_ninodes.load(Ordering::Relaxed)
	}

	/// Current reference count.
	pub fn count(&self) -> u32 {
		self.s_count.load(Ordering::Acquire)
	}

	/// Root dentry, if initialized.
	pub fn root(&self) -> Option<Arc<Dentry>> {
		self.s_root.lock().clone()
	}

	/// Install the pinned root dentry.
	pub fn set_root(&self, root: Arc<Dentry>) {
		*self.s_root.lock() = Some(root);
	}

	/// Place a fresh inode on the {all} and {clean} lists.
	pub fn inode_attach(&self, inode: &Arc<Inode>) {
		self.s_all.lock().push(inode.clone());
		self.s_state.lock().clean.push(inode.clone());
		self.s_ninodes.fetch_add(1, Ordering::Relaxed);
	}

	/// Remove an inode from every list.
	pub fn inode_detach(&self, inode: &Arc<Inode>) {
		let mut all = self.s_all.lock();
		let before = all.len();
		all.retain(|i| !Arc::ptr_eq(i, inode));
		if all.len() != before {
			self.s_ninodes.fetch_sub(1, Ordering::Relaxed);
		}
		drop(all);
		let mut state = self.s_state.lock();
		state.clean.retain(|i| !Arc::ptr_eq(i, inode));
		state.dirty.retain(|i| !Arc::ptr_eq(i, inode));
		state.io.retain(|i| !Arc::ptr_eq(i, inode));
	}

	fn inode_move(&self, inode: &Arc<Inode>, to: u8) {
		let mut state = self.s_state.lock();
		state.clean.retain(|i| !Arc::ptr_eq(i, inode));
		state.dirty.retain(|i| !Arc::ptr_eq(i, inode));
		state.io.retain(|i| !Arc::ptr_eq(i, inode));
		match to {
			0 => state.clean.push(inode.clone()),
			1 => state.dirty.push(inode.clone()),
			_ => state.io.push(inode.clone()),
		}
	}

	pub fn inode_to_clean(&self, inode: &Arc<Inode>) {
		self.inode_move(inode, 0);
	}

	pub fn inode_to_dirty(&self, inode: &Arc<Inode>) {
		self.inode_move(inode, 1);
	}

	pub fn inode_to_io(&self, inode: &Arc<Inode>) {
		self.inode_move(inode, 2);
	}

	/// True while the inode is on the {all} list.
	pub fn inode_on_all(&self, inode: &Arc<Inode>) -> bool {
		self.s_all.lock().iter().any(|i| Arc::ptr_eq(i, inode))
	}

	/// Which state list an inode currently occupies (diagnostics).
	pub fn inode_state_of(&self, inode: &Arc<Inode>) -> Option<&'static str> {
		let state = self.s_state.lock();
		if state.clean.iter().any(|i| Arc::ptr_eq(i, inode)) {
			Some("clean")
		} else if state.dirty.iter().any(|i| Arc::ptr_eq(i, inode)) {
			Some("dirty")
		} else if state.io.iter().any(|i| Arc::ptr_eq(i, inode)) {
			Some("io")
		} else {
			None
		}
	}

	/// Snapshot of the dirty list.
	pub fn dirty_inodes(&self) -> Vec<Arc<Inode>> {
		self.s_state.lock().dirty.clone()
	}

	/// Find a live inode by number, taking a reference.
	pub fn find_inode(&self, ino: u64) -> Option<Arc<Inode>> {
		let all = self.s_all.lock();
		for inode in all.iter() {
			if inode.i_ino == ino && !inode.state().contains(InodeState::CLEAR) {
				return Some(crate::fs::inode::iget(inode));
			}
		}
		None
	}

	/// Register a mount exposing this superblock.
	pub fn add_mount(&self, mnt: &Arc<VfsMount>) {
		self.s_mounts.lock().push(Arc::downgrade(mnt));
	}

	/// Forget a mount.
	pub fn remove_mount(&self, mnt: &Arc<VfsMount>) {
		self.s_mounts.lock().retain(|w| match w.upgrade() {
			Some(m) => !Arc::ptr_eq(&m, mnt),
			None => false,
		});
	}

	/// Number of live mounts on this superblock.
	pub fn mount_count(&self) -> usize {
		self.s_mounts.lock().iter().filter(|w| w.upgrade().is_some()).count()
	}
}

/// Take a superblock reference (a mount appeared or a file opened).
pub fn sb_get(sb: &Arc<SuperBlock>) {
	sb.s_count.fetch_add(1, Ordering::AcqRel);
}

/// Release a superblock reference. When only the root pin remains and no
/// mount is left, the instance is torn down.
pub fn sb_put(vfs: &Vfs, sb: &Arc<SuperBlock>) {
	let prev = sb.s_count.fetch_sub(1, Ordering::AcqRel);
	debug_assert!(prev > 0, "sb_put on a dead superblock");
	if prev == 2 && sb.mount_count() == 0 {
		kill_super(vfs, sb);
	}
}

/// Tear a superblock down: back-end PutSuper, cache purge, root unpin,
/// inode eviction. Breaks the deliberate ownership cycles so the whole
/// instance can actually drop.
pub fn kill_super(vfs: &Vfs, sb: &Arc<SuperBlock>) {
	log::debug!("kill_super: {} magic {:#x}", sb.s_fstype.name(), sb.s_magic);

	let mut fctx = FsContext::kernel(vfs);
	fctx.fc_action = Action::PutSuper;
	fctx.fc_superblock = Some(sb.clone());
	let ret = sb.s_fstype.clone().handle(&mut fctx);
	drop(fctx);
	if let Err(e) = ret {
		if e != Error::NotImplemented {
			log::warn!("put_super failed on {}: {:?}", sb.s_fstype.name(), e);
		}
	}

	vfs.dcache.prune_superblock(vfs, sb);
	if let Some(root) = sb.s_root.lock().take() {
		dput(vfs, &root);
	}

	let all: Vec<Arc<Inode>> = sb.s_all.lock().clone();
	for inode in all {
		if !inode.state().contains(InodeState::CLEAR) {
			evict(vfs, &inode);
		}
	}
	sb.s_all.lock().clear();
	{
		let mut state = sb.s_state.lock();
		state.clean.clear();
		state.dirty.clear();
		state.io.clear();
	}
	sb.s_count.store(0, Ordering::Release);
}

/// Registered back-ends, listed by unique name.
pub struct FsTypeRegistry {
	list: SpinLock<Vec<Arc<dyn FilesystemType>>>,
}

impl FsTypeRegistry {
	pub fn new() -> FsTypeRegistry {
		FsTypeRegistry { list: SpinLock::new(Vec::new()) }
	}

	/// Add a back-end; duplicate names are refused.
	pub fn register(&self, fstype: Arc<dyn FilesystemType>) -> Result<()> {
		let mut list = self.list.lock();
		if list.iter().any(|t| t.name() == fstype.name()) {
			return Err(Error::Busy);
		}
		log::info!("vfs: registered filesystem {}", fstype.name());
		list.push(fstype);
		Ok(())
	}

	/// Remove a back-end by name.
	pub fn unregister(&self, name: &str) -> Result<Arc<dyn FilesystemType>> {
		let mut list = self.list.lock();
		match list.iter().position(|t| t.name() == name) {
			Some(pos) => {
				log::info!("vfs: unregistered filesystem {}", name);
				Ok(list.remove(pos))
			}
			None => Err(Error::NoFilesystem),
		}
	}

	/// Find a back-end by name.
	pub fn lookup(&self, name: &str) -> Option<Arc<dyn FilesystemType>> {
		self.list.lock().iter().find(|t| t.name() == name).cloned()
	}

	pub fn len(&self) -> usize {
		self.list.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.list.lock().is_empty()
	}
}

impl Default for FsTypeRegistry {
	fn default() -> Self {
		Self::new()
	}
}

/// Superblock-layer intent dispatcher: full-filesystem verbs plus
/// per-inode registry verbs, delegated to the owning back-end.
pub fn super_dispatch(fctx: &mut FsContext<'_>) -> Result<()> {
	match fctx.fc_action {
		Action::CreateSuperblock => {
			let fstype = fctx.fc_fstype.clone().ok_or(Error::NoFilesystem)?;
			fstype.handle(fctx)
		}
		Action::SyncFs => sync_fs_intent(fctx),
		Action::AllocInode
		| Action::DestroyInode
		| Action::WriteInode
		| Action::EvictInode
		| Action::Statfs
		| Action::PutSuper => {
			let sb = fctx.subject_superblock()?;
			if fctx.fc_superblock.is_none() {
				fctx.fc_superblock = Some(sb.clone());
			}
			let fstype = sb.s_fstype.clone();
			fstype.handle(fctx)
		}
		_ => Err(Error::NotImplemented),
	}
}

/// Write every dirty inode back, then let the back-end flush itself.
/// A memory-only back-end may answer `NotImplemented`; that is success.
fn sync_fs_intent(fctx: &mut FsContext<'_>) -> Result<()> {
	let sb = fctx.subject_superblock()?;
	for inode in sb.dirty_inodes() {
		write_back(fctx.vfs, &inode, true)?;
	}
	if fctx.fc_superblock.is_none() {
		fctx.fc_superblock = Some(sb.clone());
	}
	let fstype = sb.s_fstype.clone();
	match fstype.handle(fctx) {
		Ok(()) | Err(Error::NotImplemented) => Ok(()),
		Err(e) => Err(e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::testutil::{NullFs, nullfs_sb};
	use crate::fs::inode::inode_alloc;
	use crate::fs::mode;

	#[test]
	fn registry_rejects_duplicates_and_looks_up() {
		let reg = FsTypeRegistry::new();
		reg.register(Arc::new(NullFs)).unwrap();
		assert_eq!(reg.register(Arc::new(NullFs)), Err(Error::Busy));
		assert!(reg.lookup("nullfs").is_some());
		assert!(reg.lookup("nope").is_none());
		reg.unregister("nullfs").unwrap();
		assert_eq!(reg.unregister("nullfs").unwrap_err(), Error::NoFilesystem);
	}

	#[test]
	fn find_inode_revives_cached_inode() {
		let vfs = Vfs::new();
		let sb = nullfs_sb();
		let inode = inode_alloc(&sb, mode::S_IFREG | 0o644);
		let ino = inode.i_ino;
		crate::fs::inode::iput(&vfs, &inode);
		// Still linked, so it stays findable.
		let again = sb.find_inode(ino).unwrap();
		assert!(Arc::ptr_eq(&again, &inode));
		crate::fs::inode::iput(&vfs, &again);
	}

	#[test]
	fn state_moves_are_exclusive() {
		let sb = nullfs_sb();
		let inode = inode_alloc(&sb, mode::S_IFREG | 0o644);
		sb.inode_to_dirty(&inode);
		assert_eq!(sb.inode_state_of(&inode), Some("dirty"));
		sb.inode_to_io(&inode);
		assert_eq!(sb.inode_state_of(&inode), Some("io"));
		sb.inode_to_clean(&inode);
		assert_eq!(sb.inode_state_of(&inode), Some("clean"));
		assert!(sb.inode_on_all(&inode));
	}
}
