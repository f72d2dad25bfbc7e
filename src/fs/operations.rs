// SPDX-License-Identifier: GPL-2.0

//! Public entry points.
//!
//! Each entry is a thin composition: validate, build a context on the
//! stack, drive the path walker and the layer dispatchers, extract the
//! typed result, and let the context release whatever references remain.
//! Errors surface as `Error` kinds; the syscall boundary maps them to
//! negative errno values.

use crate::error::{Error, Result};
use crate::fs::dentry::{dget, dput};
use crate::fs::fcontext::{
	open_to_lookup_flags, with_action, Action, FsContext, LookupFlags, OpOutput, UserBuffer,
};
use crate::fs::fdtable::fd_dispatch;
use crate::fs::file::{file_open_path, file_unref, open_flags_to_mode, FileMode, F_SPECIAL_SEEK};
use crate::fs::inode::{inode_dispatch, inode_permission, AccessMode, InodeAttr};
use crate::fs::mount::{mntget, mount_attach, mount_detach, MNT_FORCE};
use crate::fs::path::path_dispatch;
use crate::fs::qstr::Qstr;
use crate::fs::super_block::{super_dispatch, MS_BIND, MS_NODEV};
use crate::fs::{flags, KStat, KStatFs, Vfs, SEEK_CUR, SEEK_END, SEEK_SET};
use crate::sync::Arc;
use crate::task::Task;

impl Vfs {
	/// Run the path walker over the context's remaining path.
	fn walk(fctx: &mut FsContext<'_>, lf: LookupFlags) -> Result<()> {
		with_action(fctx, Action::PathLookup, lf.bits(), path_dispatch)
	}

	fn new_ctx<'a>(&'a self, task: &Arc<Task>, action: Action) -> FsContext<'a> {
		let mut fctx = FsContext::new(self, task.clone());
		fctx.fc_action = action;
		fctx.fc_intent = action;
		fctx
	}

	/// Open (and possibly create) a file; returns the new descriptor.
	pub fn open<'a>(&'a self, task: &Arc<Task>, path: &'a str, oflags: u32, mode: u32) -> Result<i32> {
		let mut fctx = self.new_ctx(task, Action::Open);
		fctx.set_path(path);
		fctx.user_flags = oflags;
		fctx.user_mode = mode;
		Self::walk(&mut fctx, open_to_lookup_flags(oflags))?;

		let dentry = fctx.current_dentry()?;
		let inode = dentry.inode().ok_or(Error::NoSuchEntry)?;
		let fmode = open_flags_to_mode(oflags);
		let mut mask = AccessMode::empty();
		if fmode.contains(FileMode::READ) {
			mask |= AccessMode::READ;
		}
		if fmode.contains(FileMode::WRITE) {
			mask |= AccessMode::WRITE;
		}
		inode_permission(&inode, mask, task.uid(), task.gid())?;
		if inode.is_dir() && fmode.contains(FileMode::WRITE) {
			return Err(Error::IsDirectory);
		}
		if inode.kind().is_device() && fctx.current_mount()?.flags() & MS_NODEV != 0 {
			return Err(Error::PermissionDenied);
		}
		if oflags & flags::O_TRUNC != 0 && fmode.contains(FileMode::WRITE) && dentry.is_regular() {
			fctx.fc_attr = Some(InodeAttr::new().with_size(0));
			with_action(&mut fctx, Action::Setattr, 0, inode_dispatch)?;
		}

		let fpath = fctx.take_path()?;
		let file = file_open_path(fpath, oflags)?;
		let fd = match task.fdtable.alloc_fd(0) {
			Ok(fd) => fd,
			Err(e) => {
				file_unref(self, &file);
				return Err(e);
			}
		};
		if let Err(e) = task.fdtable.install(fd, file.clone()) {
			task.fdtable.close(self, fd).ok();
			file_unref(self, &file);
			return Err(e);
		}
		Ok(fd)
	}

	/// Close a descriptor.
	pub fn close(&self, task: &Arc<Task>, fd: i32) -> Result<()> {
		let mut fctx = self.new_ctx(task, Action::Close);
		fctx.fc_fd = fd;
		with_action(&mut fctx, Action::FdClose, 0, fd_dispatch)
	}

	/// Read from a descriptor at its current position.
	pub fn read<'a>(&'a self, task: &Arc<Task>, fd: i32, buf: &'a mut [u8]) -> Result<usize> {
		let mut fctx = self.new_ctx(task, Action::Read);
		fctx.fc_fd = fd;
		fctx.user_buf = UserBuffer::Out(buf);
		with_action(&mut fctx, Action::FdOpen, 0, fd_dispatch)?;
		with_action(&mut fctx, Action::InodeRead, 0, inode_dispatch)?;
		fctx.fc_output.take().size()
	}

	/// Write to a descriptor at its current position.
	pub fn write<'a>(&'a self, task: &Arc<Task>, fd: i32, buf: &'a [u8]) -> Result<usize> {
		let mut fctx = self.new_ctx(task, Action::Write);
		fctx.fc_fd = fd;
		fctx.user_buf = UserBuffer::In(buf);
		with_action(&mut fctx, Action::FdOpen, 0, fd_dispatch)?;
		with_action(&mut fctx, Action::InodeWrite, 0, inode_dispatch)?;
		fctx.fc_output.take().size()
	}

	/// Reposition a descriptor. Handles with special seek semantics are
	/// forwarded to the back-end; everyone else gets the generic formula
	/// under the handle lock.
	pub fn lseek(&self, task: &Arc<Task>, fd: i32, offset: i64, whence: i32) -> Result<i64> {
		let mut fctx = self.new_ctx(task, Action::InodeLseek);
		fctx.fc_fd = fd;
		with_action(&mut fctx, Action::FdOpen, 0, fd_dispatch)?;
		let file = fctx.fc_file.clone().ok_or(Error::BadFileDescriptor)?;

		if file.f_flags.load(core::sync::atomic::Ordering::Relaxed) & F_SPECIAL_SEEK != 0 {
			fctx.fc_pos = offset;
			with_action(&mut fctx, Action::InodeLseek, whence as u32, inode_dispatch)?;
			return match fctx.fc_output.take() {
				OpOutput::Offset(n) => Ok(n),
				_ => Err(Error::InvalidInput),
			};
		}

		let mut pos = file.f_pos.lock();
		let base = match whence {
			SEEK_SET => 0,
			SEEK_CUR => *pos,
			SEEK_END => file.f_inode.size() as i64,
			_ => return Err(Error::InvalidInput),
		};
		let new_pos = base.checked_add(offset).ok_or(Error::InvalidInput)?;
		if new_pos < 0 {
			return Err(Error::InvalidInput);
		}
		*pos = new_pos;
		Ok(new_pos)
	}

	/// Create a directory.
	pub fn mkdir<'a>(&'a self, task: &Arc<Task>, path: &'a str, mode: u32) -> Result<()> {
		let mut fctx = self.new_ctx(task, Action::Mkdir);
		fctx.set_path(path);
		fctx.user_mode = mode;
		Self::walk(&mut fctx, LookupFlags::CREATE | LookupFlags::EXCL)
	}

	/// Remove an empty directory.
	pub fn rmdir<'a>(&'a self, task: &Arc<Task>, path: &'a str) -> Result<()> {
		let mut fctx = self.new_ctx(task, Action::Rmdir);
		fctx.set_path(path);
		Self::walk(&mut fctx, LookupFlags::DIRECTORY)?;
		let d = fctx.current_dentry()?;
		if d.is_mountpoint() || d.parent().is_none() {
			return Err(Error::Busy);
		}
		with_action(&mut fctx, Action::Rmdir, 0, inode_dispatch)
	}

	/// Remove a name; the object goes when the last reference does.
	pub fn unlink<'a>(&'a self, task: &Arc<Task>, path: &'a str) -> Result<()> {
		let mut fctx = self.new_ctx(task, Action::Unlink);
		fctx.set_path(path);
		Self::walk(&mut fctx, LookupFlags::empty())?;
		let d = fctx.current_dentry()?;
		if d.is_mountpoint() {
			return Err(Error::Busy);
		}
		with_action(&mut fctx, Action::Unlink, 0, inode_dispatch)
	}

	/// Create a filesystem node (regular, device, or FIFO).
	pub fn mknod<'a>(&'a self, task: &Arc<Task>, path: &'a str, mode: u32, dev: u64) -> Result<()> {
		use crate::fs::mode::{FileKind, S_IFMT, S_IFREG};
		let mode = if mode & S_IFMT == 0 { mode | S_IFREG } else { mode };
		match FileKind::from_mode(mode) {
			FileKind::Regular | FileKind::CharDevice | FileKind::BlockDevice | FileKind::Fifo
			| FileKind::Socket => {}
			_ => return Err(Error::InvalidInput),
		}
		let mut fctx = self.new_ctx(task, Action::Mknod);
		fctx.set_path(path);
		fctx.user_mode = mode;
		fctx.user_dev = dev;
		Self::walk(&mut fctx, LookupFlags::CREATE | LookupFlags::EXCL)
	}

	/// Create a symbolic link at `linkpath` pointing to `target`.
	pub fn symlink<'a>(&'a self, task: &Arc<Task>, target: &'a str, linkpath: &'a str) -> Result<()> {
		if target.is_empty() {
			return Err(Error::InvalidInput);
		}
		let mut fctx = self.new_ctx(task, Action::Symlink);
		fctx.set_path(linkpath);
		fctx.user_buf = UserBuffer::In(target.as_bytes());
		Self::walk(&mut fctx, LookupFlags::CREATE | LookupFlags::EXCL)
	}

	/// Read a symlink's target into `buf`; returns the bytes copied
	/// (silently truncated like the ambient syscall).
	pub fn readlink<'a>(&'a self, task: &Arc<Task>, path: &'a str, buf: &mut [u8]) -> Result<usize> {
		let mut fctx = self.new_ctx(task, Action::Readlink);
		fctx.set_path(path);
		Self::walk(&mut fctx, LookupFlags::REQUIRE_SYMLINK)?;
		with_action(&mut fctx, Action::Readlink, 0, inode_dispatch)?;
		match fctx.fc_output.take() {
			OpOutput::Link(s) => {
				let n = s.len().min(buf.len());
				buf[..n].copy_from_slice(&s.as_bytes()[..n]);
				Ok(n)
			}
			_ => Err(Error::InvalidInput),
		}
	}

	/// Create a hard link `newpath` to the object behind `oldpath`.
	pub fn link<'a>(&'a self, task: &Arc<Task>, oldpath: &'a str, newpath: &'a str) -> Result<()> {
		let mut fctx = self.new_ctx(task, Action::Link);
		fctx.set_path(oldpath);
		Self::walk(&mut fctx, LookupFlags::empty())?;
		let old = fctx.take_path()?;
		fctx.fc_source = Some(old);

		fctx.set_path(newpath);
		Self::walk(&mut fctx, LookupFlags::CREATE | LookupFlags::EXCL)
	}

	/// Rename `oldpath` to `newpath`, atomically with respect to lookups
	/// of either name.
	pub fn rename<'a>(&'a self, task: &Arc<Task>, oldpath: &'a str, newpath: &'a str) -> Result<()> {
		let mut fctx = self.new_ctx(task, Action::Rename);
		fctx.set_path(oldpath);
		Self::walk(&mut fctx, LookupFlags::empty())?;
		let old = fctx.take_path()?;
		if old.dentry.is_mountpoint() || old.dentry.parent().is_none() {
			fctx.fc_source = Some(old);
			return Err(Error::Busy);
		}
		fctx.fc_source = Some(old);

		fctx.set_path(newpath);
		Self::walk(&mut fctx, LookupFlags::RENAME_TARGET)?;
		let target = fctx.current_dentry()?;
		let src = &fctx.fc_source.as_ref().ok_or(Error::InvalidInput)?.dentry;
		if Arc::ptr_eq(&target, src) {
			return Ok(());
		}
		if target.is_mountpoint() {
			return Err(Error::Busy);
		}
		with_action(&mut fctx, Action::Rename, 0, inode_dispatch)
	}

	/// Mount a filesystem (or bind an existing subtree) at `target`.
	pub fn mount<'a>(
		&'a self,
		task: &Arc<Task>,
		source: &'a str,
		target: &'a str,
		fstype_name: &str,
		mflags: u32,
		data: Option<&'a str>,
	) -> Result<()> {
		let fstype = self.fstypes.lookup(fstype_name).ok_or(Error::NoFilesystem)?;
		let bind = mflags & MS_BIND != 0;

		let mut fctx = self.new_ctx(task, Action::Mount);
		fctx.user_flags = mflags;
		fctx.fc_data = data;
		fctx.fc_fstype = Some(fstype.clone());
		fctx.user_buf = UserBuffer::In(source.as_bytes());

		if bind {
			fctx.set_path(source);
			Self::walk(&mut fctx, LookupFlags::DIRECTORY | LookupFlags::FOLLOW)?;
			let src = fctx.take_path()?;
			fctx.fc_source = Some(src);
		}

		fctx.set_path(target);
		Self::walk(&mut fctx, LookupFlags::DIRECTORY)?;

		let action = if bind { Action::MountBind } else { Action::Mount };
		with_action(&mut fctx, action, mflags, |c| fstype.handle(c))?;
		log::info!("vfs: mounted {} on {} ({})", source, target, fstype_name);
		Ok(())
	}

	/// Unmount whatever is mounted at `target`. Privileged; FORCE detaches
	/// a busy mount.
	pub fn umount<'a>(&'a self, task: &Arc<Task>, target: &'a str, uflags: u32) -> Result<()> {
		let mut fctx = self.new_ctx(task, Action::Umount);
		fctx.set_path(target);
		fctx.user_flags = uflags;
		Self::walk(&mut fctx, LookupFlags::DIRECTORY | LookupFlags::MOUNTPOINT)?;

		let mnt = fctx.current_mount()?;
		let d = fctx.current_dentry()?;
		if !Arc::ptr_eq(&d, &mnt.mnt_root) || mnt.attached_at().is_none() {
			return Err(Error::InvalidInput);
		}
		if task.uid() != 0 {
			return Err(Error::PermissionDenied);
		}
		// One reference from the table, one from this walk.
		if mnt.count() > 2 && uflags & MNT_FORCE == 0 {
			return Err(Error::Busy);
		}

		let fstype = mnt.mnt_sb.s_fstype.clone();
		match with_action(&mut fctx, Action::UmountFs, uflags, |c| fstype.handle(c)) {
			Ok(()) | Err(Error::NotImplemented) => {}
			Err(e) => return Err(e),
		}
		mount_detach(self, &mnt)?;
		log::info!("vfs: unmounted {}", target);
		Ok(())
	}

	/// Swap the process root to `new_root` (a mount root) and re-anchor
	/// the old root mount at `put_old`. Privileged.
	pub fn pivot_root<'a>(&'a self, task: &Arc<Task>, new_root: &'a str, put_old: &'a str) -> Result<()> {
		if task.uid() != 0 {
			return Err(Error::PermissionDenied);
		}
		let mut fctx = self.new_ctx(task, Action::None);
		fctx.set_path(new_root);
		Self::walk(&mut fctx, LookupFlags::DIRECTORY)?;
		let newp = fctx.take_path()?;
		if !Arc::ptr_eq(&newp.dentry, &newp.mnt.mnt_root) {
			newp.put(self);
			return Err(Error::InvalidInput);
		}

		// put_old resolves inside the new root.
		fctx.fc_mount = Some(mntget(&newp.mnt));
		fctx.fc_dentry = Some(dget(&newp.dentry));
		fctx.set_path(put_old);
		Self::walk(&mut fctx, LookupFlags::DIRECTORY | LookupFlags::IN_ROOT)?;
		let old_place = fctx.take_path()?;

		// The new root stops being an ordinary mount: detaching it keeps
		// the mount graph acyclic once the old root hangs below it.
		if newp.mnt.attached_at().is_some() {
			mount_detach(self, &newp.mnt)?;
		}
		let old_root = task.set_root(newp);
		if let Some(old) = old_root {
			if old.mnt.attached_at().is_none() {
				// The old root mount loses its root status; hang it below
				// the new tree. The mount table takes the path's reference.
				mount_attach(self, &old.mnt, &old_place.mnt, &old_place.dentry);
				dput(self, &old.dentry);
			} else {
				old.put(self);
			}
		}
		old_place.put(self);
		Ok(())
	}

	/// Stat by path, following symlinks.
	pub fn stat<'a>(&'a self, task: &Arc<Task>, path: &'a str) -> Result<KStat> {
		self.stat_common(task, path, LookupFlags::FOLLOW)
	}

	/// Stat by path without following a final symlink.
	pub fn lstat<'a>(&'a self, task: &Arc<Task>, path: &'a str) -> Result<KStat> {
		self.stat_common(task, path, LookupFlags::empty())
	}

	fn stat_common<'a>(&'a self, task: &Arc<Task>, path: &'a str, lf: LookupFlags) -> Result<KStat> {
		let mut fctx = self.new_ctx(task, Action::Getattr);
		fctx.set_path(path);
		Self::walk(&mut fctx, lf)?;
		with_action(&mut fctx, Action::Getattr, 0, inode_dispatch)?;
		match fctx.fc_output.take() {
			OpOutput::Stat(st) => Ok(st),
			_ => Err(Error::InvalidInput),
		}
	}

	/// Stat by descriptor.
	pub fn fstat(&self, task: &Arc<Task>, fd: i32) -> Result<KStat> {
		let mut fctx = self.new_ctx(task, Action::Getattr);
		fctx.fc_fd = fd;
		with_action(&mut fctx, Action::FdOpen, 0, fd_dispatch)?;
		with_action(&mut fctx, Action::Getattr, 0, inode_dispatch)?;
		match fctx.fc_output.take() {
			OpOutput::Stat(st) => Ok(st),
			_ => Err(Error::InvalidInput),
		}
	}

	/// Apply an attribute change by path.
	pub fn setattr<'a>(&'a self, task: &Arc<Task>, path: &'a str, attr: InodeAttr) -> Result<()> {
		let mut fctx = self.new_ctx(task, Action::Setattr);
		fctx.set_path(path);
		fctx.fc_attr = Some(attr);
		Self::walk(&mut fctx, LookupFlags::FOLLOW)?;
		with_action(&mut fctx, Action::Setattr, 0, inode_dispatch)
	}

	/// Change mode bits.
	pub fn chmod<'a>(&'a self, task: &Arc<Task>, path: &'a str, mode: u32) -> Result<()> {
		self.setattr(task, path, InodeAttr::new().with_mode(mode))
	}

	/// Change ownership. Root only.
	pub fn chown<'a>(&'a self, task: &Arc<Task>, path: &'a str, uid: u32, gid: u32) -> Result<()> {
		self.setattr(task, path, InodeAttr::new().with_owner(uid, gid))
	}

	/// Truncate a regular file.
	pub fn truncate<'a>(&'a self, task: &Arc<Task>, path: &'a str, size: u64) -> Result<()> {
		self.setattr(task, path, InodeAttr::new().with_size(size))
	}

	/// Filesystem statistics for the filesystem holding `path`.
	pub fn statfs<'a>(&'a self, task: &Arc<Task>, path: &'a str) -> Result<KStatFs> {
		let mut fctx = self.new_ctx(task, Action::Statfs);
		fctx.set_path(path);
		Self::walk(&mut fctx, LookupFlags::FOLLOW)?;
		with_action(&mut fctx, Action::Statfs, 0, super_dispatch)?;
		match fctx.fc_output.take() {
			OpOutput::StatFs(st) => Ok(st),
			_ => Err(Error::InvalidInput),
		}
	}

	/// Flush the filesystem holding `path`: write every dirty inode back,
	/// then let the back-end sync itself.
	pub fn sync<'a>(&'a self, task: &Arc<Task>, path: &'a str) -> Result<()> {
		let mut fctx = self.new_ctx(task, Action::SyncFs);
		fctx.set_path(path);
		Self::walk(&mut fctx, LookupFlags::FOLLOW)?;
		with_action(&mut fctx, Action::SyncFs, 0, super_dispatch)
	}

	// Xattr family. Path-based variants follow symlinks; fd-based ones go
	// through the descriptor.

	fn xattr_subject<'a>(
		&'a self,
		task: &Arc<Task>,
		path: Option<&'a str>,
		fd: i32,
		action: Action,
	) -> Result<FsContext<'a>> {
		let mut fctx = self.new_ctx(task, action);
		match path {
			Some(p) => {
				fctx.set_path(p);
				Self::walk(&mut fctx, LookupFlags::FOLLOW)?;
			}
			None => {
				if fd < 0 {
					return Err(Error::InvalidInput);
				}
				fctx.fc_fd = fd;
				with_action(&mut fctx, Action::FdOpen, 0, fd_dispatch)?;
			}
		}
		Ok(fctx)
	}

	fn do_setxattr<'a>(
		&'a self,
		task: &Arc<Task>,
		path: Option<&'a str>,
		fd: i32,
		name: &str,
		value: &'a [u8],
		xflags: u32,
	) -> Result<()> {
		if name.is_empty() {
			return Err(Error::InvalidInput);
		}
		let mut fctx = self.xattr_subject(task, path, fd, Action::Setxattr)?;
		fctx.fc_name = Some(Qstr::new(name));
		fctx.user_buf = UserBuffer::In(value);
		fctx.user_flags = xflags;
		with_action(&mut fctx, Action::InodeSetxattr, 0, inode_dispatch)
	}

	fn do_getxattr<'a>(
		&'a self,
		task: &Arc<Task>,
		path: Option<&'a str>,
		fd: i32,
		name: &str,
		value: Option<&'a mut [u8]>,
	) -> Result<usize> {
		if name.is_empty() {
			return Err(Error::InvalidInput);
		}
		let mut fctx = self.xattr_subject(task, path, fd, Action::Getxattr)?;
		fctx.fc_name = Some(Qstr::new(name));
		fctx.user_buf = match value {
			Some(b) => UserBuffer::Out(b),
			None => UserBuffer::None,
		};
		with_action(&mut fctx, Action::InodeGetxattr, 0, inode_dispatch)?;
		fctx.fc_output.take().size()
	}

	fn do_listxattr<'a>(
		&'a self,
		task: &Arc<Task>,
		path: Option<&'a str>,
		fd: i32,
		list: Option<&'a mut [u8]>,
	) -> Result<usize> {
		let mut fctx = self.xattr_subject(task, path, fd, Action::Listxattr)?;
		fctx.user_buf = match list {
			Some(b) => UserBuffer::Out(b),
			None => UserBuffer::None,
		};
		with_action(&mut fctx, Action::InodeListxattr, 0, inode_dispatch)?;
		fctx.fc_output.take().size()
	}

	fn do_removexattr<'a>(
		&'a self,
		task: &Arc<Task>,
		path: Option<&'a str>,
		fd: i32,
		name: &str,
	) -> Result<()> {
		if name.is_empty() {
			return Err(Error::InvalidInput);
		}
		let mut fctx = self.xattr_subject(task, path, fd, Action::Removexattr)?;
		fctx.fc_name = Some(Qstr::new(name));
		with_action(&mut fctx, Action::InodeRemovexattr, 0, inode_dispatch)
	}

	pub fn setxattr<'a>(
		&'a self,
		task: &Arc<Task>,
		path: &'a str,
		name: &str,
		value: &'a [u8],
		xflags: u32,
	) -> Result<()> {
		self.do_setxattr(task, Some(path), -1, name, value, xflags)
	}

	pub fn fsetxattr<'a>(
		&'a self,
		task: &Arc<Task>,
		fd: i32,
		name: &str,
		value: &'a [u8],
		xflags: u32,
	) -> Result<()> {
		self.do_setxattr(task, None, fd, name, value, xflags)
	}

	pub fn getxattr<'a>(
		&'a self,
		task: &Arc<Task>,
		path: &'a str,
		name: &str,
		value: Option<&'a mut [u8]>,
	) -> Result<usize> {
		self.do_getxattr(task, Some(path), -1, name, value)
	}

	pub fn fgetxattr<'a>(
		&'a self,
		task: &Arc<Task>,
		fd: i32,
		name: &str,
		value: Option<&'a mut [u8]>,
	) -> Result<usize> {
		self.do_getxattr(task, None, fd, name, value)
	}

	pub fn listxattr<'a>(
		&'a self,
		task: &Arc<Task>,
		path: &'a str,
		list: Option<&'a mut [u8]>,
	) -> Result<usize> {
		self.do_listxattr(task, Some(path), -1, list)
	}

	pub fn flistxattr<'a>(
		&'a self,
		task: &Arc<Task>,
		fd: i32,
		list: Option<&'a mut [u8]>,
	) -> Result<usize> {
		self.do_listxattr(task, None, fd, list)
	}

	pub fn removexattr<'a>(&'a self, task: &Arc<Task>, path: &'a str, name: &str) -> Result<()> {
		self.do_removexattr(task, Some(path), -1, name)
	}

	pub fn fremovexattr(&self, task: &Arc<Task>, fd: i32, name: &str) -> Result<()> {
		self.do_removexattr(task, None, fd, name)
	}
}
