// SPDX-License-Identifier: GPL-2.0

//! Virtual File System core.
//!
//! The module tree mirrors the layer structure: name interning, the
//! dentry cache, inode lifecycle, superblocks and filesystem types, the
//! mount topology, the operation context and dispatchers, the path
//! walker, file handles and fd tables, the public entry points, and the
//! in-memory reference back-end.

pub mod dentry;
pub mod fcontext;
pub mod fdtable;
pub mod file;
pub mod inode;
pub mod mode;
pub mod mount;
pub mod operations;
pub mod path;
pub mod qstr;
pub mod ramfs;
pub mod super_block;

pub use dentry::{Dentry, DentryCache, DentryFlags};
pub use fcontext::{open_to_lookup_flags, with_action, Action, FsContext, LookupFlags, OpOutput, UserBuffer};
pub use fdtable::FdTable;
pub use file::File;
pub use inode::{Inode, InodeAttr, InodeState};
pub use mount::{MountTable, VfsMount};
pub use path::Path;
pub use qstr::Qstr;
pub use super_block::{FilesystemType, FsCapabilities, FsFlags, FsTypeRegistry, SuperBlock};

use crate::error::{Error, Result};
use crate::sync::{Arc, SpinLock};
use crate::task::Task;

/// Maximum length of one path component.
pub const NAME_MAX: usize = 255;
/// Maximum length of a whole path.
pub const PATH_MAX: usize = 4096;

/// Seek anchors.
pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

/// setxattr control: fail if the attribute exists.
pub const XATTR_CREATE: u32 = 1;
/// setxattr control: fail unless the attribute exists.
pub const XATTR_REPLACE: u32 = 2;

/// Open flags.
pub mod flags {
	pub const O_ACCMODE: u32 = 0o00000003;
	pub const O_RDONLY: u32 = 0o00000000;
	pub const O_WRONLY: u32 = 0o00000001;
	pub const O_RDWR: u32 = 0o00000002;
	pub const O_CREAT: u32 = 0o00000100;
	pub const O_EXCL: u32 = 0o00000200;
	pub const O_NOCTTY: u32 = 0o00000400;
	pub const O_TRUNC: u32 = 0o00001000;
	pub const O_APPEND: u32 = 0o00002000;
	pub const O_NONBLOCK: u32 = 0o00004000;
	pub const O_DIRECTORY: u32 = 0o00200000;
	pub const O_NOFOLLOW: u32 = 0o00400000;
	pub const O_CLOEXEC: u32 = 0o02000000;
}

/// File attributes as returned to callers.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KStat {
	pub st_dev: u64,
	pub st_ino: u64,
	pub st_nlink: u64,
	pub st_mode: u32,
	pub st_uid: u32,
	pub st_gid: u32,
	pub st_rdev: u64,
	pub st_size: i64,
	pub st_blksize: u64,
	pub st_blocks: u64,
	pub st_atime: i64,
	pub st_mtime: i64,
	pub st_ctime: i64,
}

/// Filesystem statistics.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KStatFs {
	pub f_type: u64,
	pub f_bsize: u64,
	pub f_blocks: u64,
	pub f_bfree: u64,
	pub f_bavail: u64,
	pub f_files: u64,
	pub f_ffree: u64,
	pub f_namelen: u64,
	pub f_frsize: u64,
	pub f_flags: u64,
}

/// One VFS namespace: the dentry cache, the mount table, the registered
/// back-ends, and the root anchor. Tests build isolated instances; a
/// kernel would own exactly one.
pub struct Vfs {
	pub dcache: DentryCache,
	pub mounts: MountTable,
	pub fstypes: FsTypeRegistry,
	root: SpinLock<Option<Path>>,
}

impl Vfs {
	/// Empty namespace with nothing registered or mounted.
	pub fn new() -> Vfs {
		Vfs {
			dcache: DentryCache::new(),
			mounts: MountTable::new(),
			fstypes: FsTypeRegistry::new(),
			root: SpinLock::new(None),
		}
	}

	/// Register a back-end and run its InitFs hook.
	pub fn register_filesystem(&self, fstype: Arc<dyn FilesystemType>) -> Result<()> {
		self.fstypes.register(fstype.clone())?;
		let mut fctx = FsContext::kernel(self);
		fctx.fc_action = Action::InitFs;
		fctx.fc_fstype = Some(fstype.clone());
		let ret = fstype.handle(&mut fctx);
		drop(fctx);
		match ret {
			Ok(()) | Err(Error::NotImplemented) => Ok(()),
			Err(e) => {
				self.fstypes.unregister(fstype.name()).ok();
				Err(e)
			}
		}
	}

	/// Remove a back-end after running its ExitFs hook.
	pub fn unregister_filesystem(&self, name: &str) -> Result<()> {
		let fstype = self.fstypes.unregister(name)?;
		let mut fctx = FsContext::kernel(self);
		fctx.fc_action = Action::ExitFs;
		fctx.fc_fstype = Some(fstype.clone());
		match fstype.handle(&mut fctx) {
			Ok(()) | Err(Error::NotImplemented) => Ok(()),
			Err(e) => Err(e),
		}
	}

	/// Mount the global root filesystem and hand back the first task,
	/// anchored at the new root.
	pub fn mount_rootfs(&self, fstype_name: &str) -> Result<Arc<Task>> {
		if self.root.lock().is_some() {
			return Err(Error::Busy);
		}
		let fstype = self.fstypes.lookup(fstype_name).ok_or(Error::NoFilesystem)?;
		let boot = Task::bare(0);
		let mut fctx = FsContext::new(self, boot);
		fctx.fc_fstype = Some(fstype.clone());
		fctx.user_flags = super_block::MS_ROOTFS;
		with_action(&mut fctx, Action::Mount, 0, |c| fstype.handle(c))?;
		let mnt = match fctx.fc_output.take() {
			OpOutput::Mount(m) => m,
			_ => return Err(Error::NoDevice),
		};
		drop(fctx);

		let root_dentry = dentry::dget(&mnt.mnt_root);
		let root = Path { mnt, dentry: root_dentry };
		*self.root.lock() = Some(root.get());
		log::info!("vfs: rootfs mounted ({})", fstype_name);
		Ok(Task::with_root(1, root))
	}

	/// The global root anchor, with references.
	pub fn root_path(&self) -> Option<Path> {
		self.root.lock().as_ref().map(|p| p.get())
	}

	/// Drop the root anchor; with no tasks or files left this tears the
	/// root filesystem down.
	pub fn shutdown(&self) {
		let root = self.root.lock().take();
		if let Some(p) = root {
			p.put(self);
		}
	}
}

impl Default for Vfs {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
pub(crate) mod testutil {
	use super::*;

	/// A back-end that implements nothing: every action reports
	/// `NotImplemented`. Unit tests use it to drive the generic layers.
	pub struct NullFs;

	impl FilesystemType for NullFs {
		fn name(&self) -> &'static str {
			"nullfs"
		}

		fn handle(&self, _fctx: &mut FsContext<'_>) -> Result<()> {
			Err(Error::NotImplemented)
		}
	}

	/// A superblock over [`NullFs`].
	pub fn nullfs_sb() -> Arc<SuperBlock> {
		SuperBlock::new(Arc::new(NullFs), 0x4e554c, 0)
	}
}
