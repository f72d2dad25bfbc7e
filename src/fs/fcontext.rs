// SPDX-License-Identifier: GPL-2.0

//! The operation context: one request packet carried by one thread
//! through every VFS layer.
//!
//! A context bundles the subject (path cursor, current `(dentry, mount)`
//! pair, optional file handle), the current name component, the verb
//! (action plus action flags), the object operands (buffers, mode, device
//! id, filesystem type), the untouchable user-supplied fields, a typed
//! result slot, and the identity of the invoking task. Each layer exposes
//! a single dispatch function keyed on the action; a handler may re-enter
//! another layer under a different verb through [`with_action`], which
//! restores the saved verb on return only.

use alloc::string::String;

use crate::error::{Error, Result};
use crate::fs::dentry::Dentry;
use crate::fs::file::File;
use crate::fs::inode::{iput, Inode, InodeAttr};
use crate::fs::mount::VfsMount;
use crate::fs::path::Path;
use crate::fs::qstr::Qstr;
use crate::fs::super_block::{FilesystemType, SuperBlock};
use crate::fs::{flags, KStat, KStatFs, Vfs};
use crate::sync::Arc;
use crate::task::Task;

/// Action code carried by a context. Values are grouped by the layer that
/// answers them; unknown actions get `NotImplemented` from every dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
	None,
	// Top-level verbs
	Create,
	Open,
	Close,
	Mkdir,
	Mknod,
	Rmdir,
	Unlink,
	Symlink,
	Rename,
	Link,
	Readlink,
	Read,
	Write,
	Umount,
	// xattr verbs
	Getxattr,
	Setxattr,
	Listxattr,
	Removexattr,
	Getacl,
	Setacl,
	// Attribute verbs
	Getattr,
	Setattr,
	Fiemap,
	Lookup,
	PathLookup,
	// Filesystem verbs
	InitFs,
	ExitFs,
	Mount,
	MountBind,
	UmountFs,
	CreateSuperblock,
	// fd verbs
	FdOpen,
	FdClose,
	// Inode-layer verbs
	InodeRead,
	InodeWrite,
	InodeLseek,
	InodeSetxattr,
	InodeGetxattr,
	InodeListxattr,
	InodeRemovexattr,
	// Superblock-layer verbs
	AllocInode,
	DestroyInode,
	WriteInode,
	EvictInode,
	SyncFs,
	Statfs,
	PutSuper,
}

bitflags::bitflags! {
	/// Path lookup mode bits. At most one of `REQUIRE_REGULAR`,
	/// `REQUIRE_SYMLINK`, `DIRECTORY` may be set.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct LookupFlags: u32 {
		/// Follow a symlink in the final component
		const FOLLOW         = 0x0001;
		/// Require the result to be a directory
		const DIRECTORY      = 0x0002;
		/// Force terminal automount (accepted, no automount points exist)
		const AUTOMOUNT      = 0x0004;
		/// Internal: resolve to the parent of the last component
		const PARENT         = 0x0010;
		/// Distrust cached positives; re-validate through the back-end
		const REVAL          = 0x0020;
		/// RCU pathwalk mode (accepted; this walker always takes locks)
		const RCU            = 0x0040;
		/// Follow mounts at the end of the walk
		const MOUNTPOINT     = 0x0080;
		/// Final component is being opened
		const OPEN           = 0x0100;
		/// Final component may be created
		const CREATE         = 0x0200;
		/// Creation must be exclusive
		const EXCL           = 0x0400;
		/// Final component is the destination of rename()
		const RENAME_TARGET  = 0x0800;
		/// Accept the empty path (resolves to the anchor)
		const EMPTY          = 0x4000;
		/// Follow mounts at the starting point
		const DOWN           = 0x8000;
		/// Forbid any symlink crossing
		const NO_SYMLINKS    = 0x0001_0000;
		/// Forbid magic-link crossing (accepted; none exist here)
		const NO_MAGICLINKS  = 0x0002_0000;
		/// Forbid mountpoint crossing
		const NO_XDEV        = 0x0004_0000;
		/// `..` may not escape the starting point
		const BENEATH        = 0x0008_0000;
		/// Treat the starting directory as the root for absolute paths
		const IN_ROOT        = 0x0010_0000;
		/// Only consult the cache; never call the back-end
		const CACHED         = 0x0020_0000;
		/// Require a regular file
		const REQUIRE_REGULAR = 0x0040_0000;
		/// Require a symlink
		const REQUIRE_SYMLINK = 0x0080_0000;
	}
}

/// Map open(2)-style flags onto lookup flags, bit-for-bit compatible with
/// the ambient open semantics: `OPEN` and `DOWN` are always set, `O_CREAT`
/// adds `CREATE`, `O_CREAT|O_EXCL` adds `EXCL` and `REVAL`, the final
/// symlink is followed unless `O_NOFOLLOW`, `O_DIRECTORY` demands a
/// directory and `O_TRUNC` follows mounts at the end.
pub fn open_to_lookup_flags(open_flags: u32) -> LookupFlags {
	let mut lf = LookupFlags::OPEN | LookupFlags::DOWN;
	if open_flags & flags::O_CREAT != 0 {
		lf |= LookupFlags::CREATE;
		if open_flags & flags::O_EXCL != 0 {
			lf |= LookupFlags::EXCL | LookupFlags::REVAL;
		}
	}
	if open_flags & flags::O_NOFOLLOW == 0 {
		lf |= LookupFlags::FOLLOW;
	}
	if open_flags & flags::O_DIRECTORY != 0 {
		lf |= LookupFlags::DIRECTORY;
	}
	if open_flags & flags::O_TRUNC != 0 {
		lf |= LookupFlags::MOUNTPOINT;
	}
	lf
}

/// Borrowed user buffer for data-moving verbs.
pub enum UserBuffer<'a> {
	None,
	/// Data flowing from the caller into the VFS (write, setxattr,
	/// symlink target).
	In(&'a [u8]),
	/// Data flowing out to the caller (read, getxattr, listxattr).
	Out(&'a mut [u8]),
}

impl UserBuffer<'_> {
	/// Length of whichever buffer is present.
	pub fn len(&self) -> usize {
		match self {
			UserBuffer::None => 0,
			UserBuffer::In(b) => b.len(),
			UserBuffer::Out(b) => b.len(),
		}
	}

	/// True when no buffer was supplied.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Typed result slot. The action defines which variant a handler stores;
/// this replaces the classic type-erased output pointer.
#[derive(Default)]
pub enum OpOutput {
	#[default]
	None,
	Size(usize),
	Offset(i64),
	Fd(i32),
	Inode(Arc<Inode>),
	Superblock(Arc<SuperBlock>),
	Mount(Arc<VfsMount>),
	Stat(KStat),
	StatFs(KStatFs),
	Link(String),
}

impl OpOutput {
	/// Take the slot, leaving `None`.
	pub fn take(&mut self) -> OpOutput {
		core::mem::take(self)
	}

	/// Extract a byte count or fail with `InvalidInput`.
	pub fn size(self) -> Result<usize> {
		match self {
			OpOutput::Size(n) => Ok(n),
			_ => Err(Error::InvalidInput),
		}
	}
}

/// Handler signature shared by every layer dispatcher and back-end.
pub type IntentHandler = fn(&mut FsContext<'_>) -> Result<()>;

/// The per-request context. Lives on the caller's stack; dropping it
/// releases every strong reference it still holds, so failure paths stay
/// caller-cleanable.
pub struct FsContext<'a> {
	pub vfs: &'a Vfs,

	// Identity
	pub fc_task: Option<Arc<Task>>,

	// Subject
	pub path_string: &'a str,
	pub fc_remaining: String,
	pub fc_fd: i32,
	pub fc_file: Option<Arc<File>>,
	pub fc_dentry: Option<Arc<Dentry>>,
	pub fc_mount: Option<Arc<VfsMount>>,
	/// Auxiliary resolved path: mount source, link target, rename source.
	pub fc_source: Option<Path>,
	/// Inode operand for registry verbs without a dentry (write-back, evict).
	pub fc_inode: Option<Arc<Inode>>,

	// Name slot
	pub fc_name: Option<Qstr>,

	// Filesystem objects
	pub fc_fstype: Option<Arc<dyn FilesystemType>>,
	pub fc_superblock: Option<Arc<SuperBlock>>,

	// Verb
	pub fc_action: Action,
	pub fc_action_flags: u32,
	/// Top-level verb of the request. Never touched by `with_action`, so
	/// the walker can pick the right creation verb while running under a
	/// scoped PATH_LOOKUP override.
	pub fc_intent: Action,

	// User-supplied; never mutated once set
	pub user_flags: u32,
	pub user_mode: u32,
	pub user_dev: u64,
	pub fc_data: Option<&'a str>,

	// Object operands
	pub user_buf: UserBuffer<'a>,
	pub fc_attr: Option<InodeAttr>,
	pub fc_pos: i64,

	// Result slot
	pub fc_output: OpOutput,
}

impl<'a> FsContext<'a> {
	/// Fresh context for a task-driven request.
	pub fn new(vfs: &'a Vfs, task: Arc<Task>) -> FsContext<'a> {
		let mut fctx = FsContext::kernel(vfs);
		fctx.fc_task = Some(task);
		fctx
	}

	/// Context for internal maintenance work with no task behind it
	/// (superblock teardown, write-back).
	pub fn kernel(vfs: &'a Vfs) -> FsContext<'a> {
		FsContext {
			vfs,
			fc_task: None,
			path_string: "",
			fc_remaining: String::new(),
			fc_fd: -1,
			fc_file: None,
			fc_dentry: None,
			fc_mount: None,
			fc_source: None,
			fc_inode: None,
			fc_name: None,
			fc_fstype: None,
			fc_superblock: None,
			fc_action: Action::None,
			fc_action_flags: 0,
			fc_intent: Action::None,
			user_flags: 0,
			user_mode: 0,
			user_dev: 0,
			fc_data: None,
			user_buf: UserBuffer::None,
			fc_attr: None,
			fc_pos: 0,
			fc_output: OpOutput::None,
		}
	}

	/// Point the subject at a path string.
	pub fn set_path(&mut self, path: &'a str) {
		self.path_string = path;
		self.fc_remaining = String::from(path);
	}

	/// Effective uid of the invoking task (kernel contexts act as root).
	pub fn uid(&self) -> u32 {
		self.fc_task.as_ref().map_or(0, |t| t.uid())
	}

	/// Effective gid of the invoking task.
	pub fn gid(&self) -> u32 {
		self.fc_task.as_ref().map_or(0, |t| t.gid())
	}

	/// Action flags viewed as lookup bits.
	pub fn lookup_flags(&self) -> LookupFlags {
		LookupFlags::from_bits_truncate(self.fc_action_flags)
	}

	/// The current dentry, or `InvalidInput` when the subject is unset.
	pub fn current_dentry(&self) -> Result<Arc<Dentry>> {
		self.fc_dentry.clone().ok_or(Error::InvalidInput)
	}

	/// The current mount, or `InvalidInput` when the subject is unset.
	pub fn current_mount(&self) -> Result<Arc<VfsMount>> {
		self.fc_mount.clone().ok_or(Error::InvalidInput)
	}

	/// Replace the current dentry, releasing the reference on the old one.
	pub fn replace_dentry(&mut self, dentry: Arc<Dentry>) {
		if let Some(old) = self.fc_dentry.replace(dentry) {
			crate::fs::dentry::dput(self.vfs, &old);
		}
	}

	/// Replace the whole `(mount, dentry)` pair, releasing old references.
	pub fn replace_pair(&mut self, mount: Arc<VfsMount>, dentry: Arc<Dentry>) {
		self.replace_dentry(dentry);
		if let Some(old) = self.fc_mount.replace(mount) {
			crate::fs::mount::mntput(self.vfs, &old);
		}
	}

	/// Move the resolved `(mount, dentry)` pair out of the context,
	/// transferring its references to the caller.
	pub fn take_path(&mut self) -> Result<Path> {
		match (self.fc_dentry.take(), self.fc_mount.take()) {
			(Some(dentry), Some(mnt)) => Ok(Path { mnt, dentry }),
			(dentry, mnt) => {
				self.fc_dentry = dentry;
				self.fc_mount = mnt;
				Err(Error::NoSuchEntry)
			}
		}
	}

	/// Superblock the current subject belongs to.
	pub fn subject_superblock(&self) -> Result<Arc<SuperBlock>> {
		if let Some(sb) = &self.fc_superblock {
			return Ok(sb.clone());
		}
		if let Some(d) = &self.fc_dentry {
			return Ok(d.d_sb.clone());
		}
		if let Some(f) = &self.fc_file {
			return Ok(f.f_inode.i_sb.clone());
		}
		Err(Error::InvalidInput)
	}
}

impl Drop for FsContext<'_> {
	fn drop(&mut self) {
		if let Some(d) = self.fc_dentry.take() {
			crate::fs::dentry::dput(self.vfs, &d);
		}
		if let Some(m) = self.fc_mount.take() {
			crate::fs::mount::mntput(self.vfs, &m);
		}
		if let Some(p) = self.fc_source.take() {
			p.put(self.vfs);
		}
		if let Some(f) = self.fc_file.take() {
			crate::fs::file::file_unref(self.vfs, &f);
		}
		if let Some(i) = self.fc_inode.take() {
			iput(self.vfs, &i);
		}
	}
}

/// Scoped action switch: run `f` with `(action, action_flags)` overridden,
/// restoring the saved verb when `f` returns. The override stays visible
/// for the whole call; restoration happens on return only.
pub fn with_action<R>(
	fctx: &mut FsContext<'_>,
	action: Action,
	action_flags: u32,
	f: impl FnOnce(&mut FsContext<'_>) -> R,
) -> R {
	let saved_action = fctx.fc_action;
	let saved_flags = fctx.fc_action_flags;
	fctx.fc_action = action;
	fctx.fc_action_flags = action_flags;
	let ret = f(fctx);
	fctx.fc_action = saved_action;
	fctx.fc_action_flags = saved_flags;
	ret
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::flags::*;

	#[test]
	fn with_action_restores_on_return() {
		let vfs = Vfs::new();
		let mut fctx = FsContext::kernel(&vfs);
		fctx.fc_action = Action::Open;
		fctx.fc_action_flags = 7;
		let seen = with_action(&mut fctx, Action::Lookup, 42, |c| {
			(c.fc_action, c.fc_action_flags)
		});
		assert_eq!(seen, (Action::Lookup, 42));
		assert_eq!(fctx.fc_action, Action::Open);
		assert_eq!(fctx.fc_action_flags, 7);
	}

	#[test]
	fn open_flag_mapping_is_bit_exact() {
		let lf = open_to_lookup_flags(O_RDONLY);
		assert!(lf.contains(LookupFlags::OPEN | LookupFlags::DOWN));
		assert!(lf.contains(LookupFlags::FOLLOW));
		assert!(!lf.contains(LookupFlags::CREATE));

		let lf = open_to_lookup_flags(O_CREAT | O_EXCL);
		assert!(lf.contains(LookupFlags::CREATE | LookupFlags::EXCL));
		assert!(lf.contains(LookupFlags::REVAL));

		let lf = open_to_lookup_flags(O_CREAT);
		assert!(lf.contains(LookupFlags::CREATE));
		assert!(!lf.contains(LookupFlags::EXCL));

		let lf = open_to_lookup_flags(O_NOFOLLOW);
		assert!(!lf.contains(LookupFlags::FOLLOW));

		let lf = open_to_lookup_flags(O_DIRECTORY);
		assert!(lf.contains(LookupFlags::DIRECTORY));

		let lf = open_to_lookup_flags(O_TRUNC);
		assert!(lf.contains(LookupFlags::MOUNTPOINT));
	}
}
