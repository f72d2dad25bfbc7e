// SPDX-License-Identifier: GPL-2.0

//! In-memory filesystem back-end.
//!
//! Everything lives in inode private data: file bytes, symlink targets,
//! per-directory name maps, and xattrs. Directory state is deliberately
//! kept out of the dentry cache so LRU reclaim can never lose storage —
//! a pruned subtree is re-resolved from the name maps on the next lookup.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::any::Any;
use core::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::fs::fcontext::{with_action, Action, FsContext, OpOutput, UserBuffer};
use crate::fs::inode::{inode_alloc, iput, mark_dirty, Inode};
use crate::fs::mode::{self, FileKind};
use crate::fs::mount::{mount_attach, superblock_acquire_mount};
use crate::fs::super_block::{FilesystemType, FsCapabilities, FsFlags, SuperBlock, MS_ROOTFS};
use crate::fs::{KStatFs, NAME_MAX, XATTR_CREATE, XATTR_REPLACE};
use crate::sync::Arc;

/// ramfs magic number.
pub const RAMFS_MAGIC: u32 = 0x858458f6;

/// Per-inode storage payload.
#[derive(Default)]
struct RamNode {
	/// Regular-file contents
	data: Vec<u8>,
	/// Symlink target
	target: String,
	/// Directory entries: name → inode number
	children: BTreeMap<String, u64>,
	/// Extended attributes
	xattrs: BTreeMap<String, Vec<u8>>,
}

fn with_node<R>(inode: &Inode, f: impl FnOnce(&mut RamNode) -> Result<R>) -> Result<R> {
	let mut guard = inode.i_private.lock();
	let payload = guard.get_or_insert_with(|| Box::new(RamNode::default()) as Box<dyn Any + Send + Sync>);
	let node = payload
		.as_mut()
		.downcast_mut::<RamNode>()
		.ok_or(Error::InvalidInput)?;
	f(node)
}

/// The inode a ramfs action operates on: the open file's, the explicit
/// inode operand, or the current dentry's.
fn subject_inode(fctx: &FsContext<'_>) -> Result<Arc<Inode>> {
	if let Some(f) = &fctx.fc_file {
		return Ok(f.f_inode.clone());
	}
	if let Some(i) = &fctx.fc_inode {
		return Ok(i.clone());
	}
	fctx.current_dentry()?.inode().ok_or(Error::NoSuchEntry)
}

/// The in-memory filesystem type.
pub struct RamFs;

impl FilesystemType for RamFs {
	fn name(&self) -> &'static str {
		"ramfs"
	}

	fn fs_flags(&self) -> FsFlags {
		FsFlags::empty()
	}

	fn capabilities(&self) -> FsCapabilities {
		FsCapabilities::ATOMIC_RENAME
	}

	fn handle(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		match fctx.fc_action {
			Action::InitFs | Action::ExitFs => Ok(()),
			Action::CreateSuperblock => self.create_superblock(fctx),
			Action::Mount => self.mount(fctx),
			Action::MountBind => self.mount_bind(fctx),
			Action::UmountFs => Ok(()),
			Action::AllocInode => self.alloc_inode(fctx),
			Action::DestroyInode | Action::EvictInode => self.evict_inode(fctx),
			Action::WriteInode => Ok(()),
			Action::SyncFs => Ok(()),
			Action::Statfs => self.statfs(fctx),
			Action::PutSuper => Ok(()),
			Action::Lookup => self.lookup(fctx),
			Action::Create | Action::Mkdir | Action::Mknod | Action::Symlink => self.create(fctx),
			Action::Unlink => self.unlink(fctx),
			Action::Rmdir => self.rmdir(fctx),
			Action::Rename => self.rename(fctx),
			Action::Link => self.link(fctx),
			Action::Readlink => self.readlink(fctx),
			Action::Setattr => self.setattr(fctx),
			Action::InodeRead => self.read(fctx),
			Action::InodeWrite => self.write(fctx),
			Action::InodeLseek => Err(Error::NotImplemented),
			Action::InodeGetxattr => self.getxattr(fctx),
			Action::InodeSetxattr => self.setxattr(fctx),
			Action::InodeListxattr => self.listxattr(fctx),
			Action::InodeRemovexattr => self.removexattr(fctx),
			_ => Err(Error::NotImplemented),
		}
	}
}

impl RamFs {
	/// Allocate a superblock, its root inode and root dentry; leave the
	/// superblock in the context.
	fn create_superblock(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let fstype = fctx.fc_fstype.clone().ok_or(Error::NoFilesystem)?;
		let sb = SuperBlock::new(fstype, RAMFS_MAGIC, 0);
		fctx.fc_superblock = Some(sb.clone());

		with_action(fctx, Action::AllocInode, mode::S_IFDIR | 0o755, |c| self.handle(c))?;
		let root_inode = match fctx.fc_output.take() {
			OpOutput::Inode(i) => i,
			_ => return Err(Error::OutOfMemory),
		};

		let root = fctx.vfs.dcache.alloc_root(&sb);
		fctx.vfs.dcache.instantiate(fctx.vfs, &root, &root_inode);
		iput(fctx.vfs, &root_inode);
		sb.set_root(root);

		log::debug!("ramfs: new superblock, magic {:#x}", sb.s_magic);
		Ok(())
	}

	/// Create a fresh instance and anchor it at the context's current
	/// `(mount, dentry)` pair; a ROOTFS mount stays unanchored.
	fn mount(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let rootfs = fctx.user_flags & MS_ROOTFS != 0;
		if !rootfs && !fctx.current_dentry()?.is_dir() {
			return Err(Error::NotDirectory);
		}
		with_action(fctx, Action::CreateSuperblock, 0, |c| self.handle(c))?;
		let sb = fctx.fc_superblock.clone().ok_or(Error::NoDevice)?;
		let root = sb.root().ok_or(Error::NoDevice)?;
		let devname = match &fctx.user_buf {
			UserBuffer::In(b) => core::str::from_utf8(b).unwrap_or("none"),
			_ => "none",
		};
		let mnt = superblock_acquire_mount(&sb, &root, fctx.user_flags, devname);

		if !rootfs {
			let parent = fctx.current_mount()?;
			let mountpoint = fctx.current_dentry()?;
			mount_attach(fctx.vfs, &mnt, &parent, &mountpoint);
		}
		fctx.fc_output = OpOutput::Mount(mnt);
		Ok(())
	}

	/// Re-expose an existing subtree: same superblock, distinct mount-root
	/// dentry aliasing the source root's inode.
	fn mount_bind(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let src = fctx.fc_source.as_ref().ok_or(Error::InvalidInput)?;
		let src_dentry = src.dentry.clone();
		let src_inode = src_dentry.inode().ok_or(Error::NoSuchEntry)?;
		if !src_inode.is_dir() {
			return Err(Error::NotDirectory);
		}
		let parent = fctx.current_mount()?;
		let mountpoint = fctx.current_dentry()?;
		if !mountpoint.is_dir() {
			return Err(Error::NotDirectory);
		}
		let sb = src_dentry.d_sb.clone();

		let name = src_dentry.name();
		let alias = fctx.vfs.dcache.alloc_anon(&sb, &name);
		fctx.vfs.dcache.instantiate(fctx.vfs, &alias, &src_inode);

		let devname = match &fctx.user_buf {
			UserBuffer::In(b) => core::str::from_utf8(b).unwrap_or("none"),
			_ => "none",
		};
		let mnt = superblock_acquire_mount(&sb, &alias, fctx.user_flags, devname);
		// The mount holds its own root reference now.
		crate::fs::dentry::dput(fctx.vfs, &alias);

		mount_attach(fctx.vfs, &mnt, &parent, &mountpoint);
		fctx.fc_output = OpOutput::Mount(mnt);
		Ok(())
	}

	/// Allocate an inode; the requested mode rides in the action flags.
	/// The returned reference is balanced by the consumer's `iput`.
	fn alloc_inode(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let sb = fctx.fc_superblock.clone().ok_or(Error::NoDevice)?;
		let mode_bits = fctx.fc_action_flags;
		let inode = inode_alloc(&sb, mode_bits);
		if inode.is_dir() {
			inode.i_nlink.store(2, Ordering::Relaxed);
		}
		with_node(&inode, |_| Ok(()))?;
		fctx.fc_output = OpOutput::Inode(inode);
		Ok(())
	}

	fn evict_inode(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let inode = subject_inode(fctx)?;
		inode.i_private.lock().take();
		inode.set_size(0);
		Ok(())
	}

	fn statfs(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let sb = fctx.subject_superblock()?;
		let files = sb.ninodes() as u64;
		fctx.fc_output = OpOutput::StatFs(KStatFs {
			f_type: RAMFS_MAGIC as u64,
			f_bsize: sb.s_blocksize,
			f_blocks: 0,
			f_bfree: 0,
			f_bavail: 0,
			f_files: files,
			f_ffree: u64::MAX - files,
			f_namelen: NAME_MAX as u64,
			f_frsize: sb.s_blocksize,
			f_flags: sb.s_flags.load(Ordering::Relaxed) as u64,
		});
		Ok(())
	}

	/// Resolve one name under the current dentry's parent and bind the
	/// dentry to the inode found there.
	fn lookup(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let d = fctx.current_dentry()?;
		let parent = d.parent_or_self();
		let pinode = parent.inode().ok_or(Error::NoSuchEntry)?;
		if !pinode.is_dir() {
			return Err(Error::NotDirectory);
		}
		let name = d.name();
		let ino = with_node(&pinode, |n| {
			n.children.get(name.as_str()).copied().ok_or(Error::NoSuchEntry)
		})?;
		let inode = d.d_sb.find_inode(ino).ok_or(Error::NoSuchEntry)?;
		fctx.vfs.dcache.instantiate(fctx.vfs, &d, &inode);
		iput(fctx.vfs, &inode);
		Ok(())
	}

	/// Creation verbs: populate the negative dentry with a new object.
	fn create(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let d = fctx.current_dentry()?;
		let parent = d.parent_or_self();
		let pinode = parent.inode().ok_or(Error::NoSuchEntry)?;
		if !pinode.is_dir() {
			return Err(Error::NotDirectory);
		}
		let name = d.name().as_str().to_string();
		if name.is_empty() {
			return Err(Error::InvalidInput);
		}

		let new_mode = match fctx.fc_action {
			Action::Create => (fctx.user_mode & 0o7777) | mode::S_IFREG,
			Action::Mkdir => (fctx.user_mode & 0o7777) | mode::S_IFDIR,
			Action::Symlink => mode::S_IFLNK | 0o777,
			Action::Mknod => fctx.user_mode,
			_ => return Err(Error::NotImplemented),
		};

		let exists = with_node(&pinode, |n| Ok(n.children.contains_key(&name)))?;
		if exists {
			return Err(Error::AlreadyExists);
		}

		let sb = d.d_sb.clone();
		let saved_sb = fctx.fc_superblock.replace(sb);
		let ret = with_action(fctx, Action::AllocInode, new_mode, |c| self.handle(c));
		fctx.fc_superblock = saved_sb;
		ret?;
		let inode = match fctx.fc_output.take() {
			OpOutput::Inode(i) => i,
			_ => return Err(Error::OutOfMemory),
		};
		inode.i_uid.store(fctx.uid(), Ordering::Relaxed);
		inode.i_gid.store(fctx.gid(), Ordering::Relaxed);

		match fctx.fc_action {
			Action::Mknod => {
				inode.i_rdev.store(fctx.user_dev, Ordering::Relaxed);
			}
			Action::Symlink => {
				let target = match &fctx.user_buf {
					UserBuffer::In(b) => {
						core::str::from_utf8(b).map_err(|_| Error::BadAddress)?.to_string()
					}
					_ => return Err(Error::InvalidInput),
				};
				inode.set_size(target.len() as u64);
				with_node(&inode, |n| {
					n.target = target;
					Ok(())
				})?;
			}
			Action::Mkdir => {
				pinode.i_nlink.fetch_add(1, Ordering::AcqRel);
			}
			_ => {}
		}

		with_node(&pinode, |n| {
			n.children.insert(name, inode.i_ino);
			Ok(())
		})?;
		fctx.vfs.dcache.instantiate(fctx.vfs, &d, &inode);
		mark_dirty(&inode, false);
		iput(fctx.vfs, &inode);
		Ok(())
	}

	fn unlink(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let d = fctx.current_dentry()?;
		let parent = d.parent_or_self();
		let pinode = parent.inode().ok_or(Error::NoSuchEntry)?;
		let name = d.name();
		with_node(&pinode, |n| {
			n.children.remove(name.as_str()).map(|_| ()).ok_or(Error::NoSuchEntry)
		})
	}

	fn rmdir(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let d = fctx.current_dentry()?;
		let inode = d.inode().ok_or(Error::NoSuchEntry)?;
		let empty = with_node(&inode, |n| Ok(n.children.is_empty()))?;
		if !empty {
			return Err(Error::NotEmpty);
		}
		let parent = d.parent_or_self();
		let pinode = parent.inode().ok_or(Error::NoSuchEntry)?;
		let name = d.name();
		with_node(&pinode, |n| {
			n.children.remove(name.as_str()).map(|_| ()).ok_or(Error::NoSuchEntry)
		})?;
		pinode.i_nlink.fetch_sub(1, Ordering::AcqRel);
		Ok(())
	}

	/// Storage-level move. The replaced-inode link bookkeeping and the
	/// dentry move live in the inode layer; this only rewires name maps.
	fn rename(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let target = fctx.current_dentry()?;
		let src = fctx.fc_source.as_ref().ok_or(Error::InvalidInput)?.dentry.clone();
		let src_inode = src.inode().ok_or(Error::NoSuchEntry)?;
		let old_parent = src.parent_or_self();
		let new_parent = target.parent_or_self();
		let op_inode = old_parent.inode().ok_or(Error::NoSuchEntry)?;
		let np_inode = new_parent.inode().ok_or(Error::NoSuchEntry)?;
		let old_name = src.name();
		let new_name = target.name();

		// A replaced directory must be empty.
		let replaced = with_node(&np_inode, |n| Ok(n.children.get(new_name.as_str()).copied()))?;
		if let Some(ino) = replaced {
			if let Some(existing) = target.d_sb.find_inode(ino) {
				let blocked = existing.is_dir()
					&& with_node(&existing, |n| Ok(!n.children.is_empty()))?;
				iput(fctx.vfs, &existing);
				if blocked {
					return Err(Error::NotEmpty);
				}
			}
		}

		with_node(&op_inode, |n| {
			n.children.remove(old_name.as_str()).map(|_| ()).ok_or(Error::NoSuchEntry)
		})?;
		with_node(&np_inode, |n| {
			n.children.insert(new_name.as_str().to_string(), src_inode.i_ino);
			Ok(())
		})?;

		if src_inode.is_dir() && !Arc::ptr_eq(&op_inode, &np_inode) {
			op_inode.i_nlink.fetch_sub(1, Ordering::AcqRel);
			np_inode.i_nlink.fetch_add(1, Ordering::AcqRel);
		}
		Ok(())
	}

	/// Hard link: another name for an existing inode.
	fn link(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let newd = fctx.current_dentry()?;
		let src_inode = fctx
			.fc_source
			.as_ref()
			.ok_or(Error::InvalidInput)?
			.dentry
			.inode()
			.ok_or(Error::NoSuchEntry)?;
		let parent = newd.parent_or_self();
		let pinode = parent.inode().ok_or(Error::NoSuchEntry)?;
		let name = newd.name().as_str().to_string();

		let exists = with_node(&pinode, |n| Ok(n.children.contains_key(&name)))?;
		if exists {
			return Err(Error::AlreadyExists);
		}
		with_node(&pinode, |n| {
			n.children.insert(name, src_inode.i_ino);
			Ok(())
		})?;
		src_inode.inc_link();
		fctx.vfs.dcache.instantiate(fctx.vfs, &newd, &src_inode);
		Ok(())
	}

	fn readlink(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let inode = subject_inode(fctx)?;
		if inode.kind() != FileKind::Symlink {
			return Err(Error::InvalidInput);
		}
		let target = with_node(&inode, |n| Ok(n.target.clone()))?;
		fctx.fc_output = OpOutput::Link(target);
		Ok(())
	}

	/// Size changes from the attribute path (truncate).
	fn setattr(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let inode = subject_inode(fctx)?;
		let attr = fctx.fc_attr.ok_or(Error::InvalidInput)?;
		if let Some(size) = attr.size {
			with_node(&inode, |n| {
				n.data.resize(size as usize, 0);
				Ok(())
			})?;
			inode.set_size(size);
		}
		Ok(())
	}

	fn read(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let inode = subject_inode(fctx)?;
		let pos = usize::try_from(fctx.fc_pos).map_err(|_| Error::InvalidInput)?;
		let n = with_node(&inode, |node| {
			let buf = match &mut fctx.user_buf {
				UserBuffer::Out(b) => b,
				_ => return Err(Error::BadAddress),
			};
			let avail = node.data.len().saturating_sub(pos);
			let n = avail.min(buf.len());
			buf[..n].copy_from_slice(&node.data[pos..pos + n]);
			Ok(n)
		})?;
		fctx.fc_output = OpOutput::Size(n);
		Ok(())
	}

	fn write(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let inode = subject_inode(fctx)?;
		let pos = usize::try_from(fctx.fc_pos).map_err(|_| Error::InvalidInput)?;
		let n = with_node(&inode, |node| {
			let buf = match &fctx.user_buf {
				UserBuffer::In(b) => b,
				_ => return Err(Error::BadAddress),
			};
			if node.data.len() < pos + buf.len() {
				node.data.resize(pos + buf.len(), 0);
			}
			node.data[pos..pos + buf.len()].copy_from_slice(buf);
			Ok(buf.len())
		})?;
		inode.set_size(inode.size().max((pos + n) as u64));
		mark_dirty(&inode, true);
		fctx.fc_output = OpOutput::Size(n);
		Ok(())
	}

	fn xattr_name(fctx: &FsContext<'_>) -> Result<String> {
		let name = fctx.fc_name.as_ref().ok_or(Error::InvalidInput)?;
		if name.is_empty() || name.len() > NAME_MAX {
			return Err(Error::InvalidInput);
		}
		Ok(name.as_str().to_string())
	}

	fn setxattr(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let inode = subject_inode(fctx)?;
		let name = Self::xattr_name(fctx)?;
		let value = match &fctx.user_buf {
			UserBuffer::In(b) => b.to_vec(),
			UserBuffer::None => Vec::new(),
			_ => return Err(Error::BadAddress),
		};
		let xflags = fctx.user_flags;
		with_node(&inode, |n| {
			let present = n.xattrs.contains_key(&name);
			if xflags & XATTR_CREATE != 0 && present {
				return Err(Error::AlreadyExists);
			}
			if xflags & XATTR_REPLACE != 0 && !present {
				return Err(Error::NoSuchEntry);
			}
			n.xattrs.insert(name, value);
			Ok(())
		})?;
		inode.touch_ctime();
		mark_dirty(&inode, false);
		Ok(())
	}

	fn getxattr(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let inode = subject_inode(fctx)?;
		let name = Self::xattr_name(fctx)?;
		let n = with_node(&inode, |node| {
			let value = node.xattrs.get(&name).ok_or(Error::NoSuchEntry)?;
			match &mut fctx.user_buf {
				// Size probe: no buffer means "tell me how much".
				UserBuffer::None => Ok(value.len()),
				UserBuffer::Out(b) => {
					if b.len() < value.len() {
						return Err(Error::InvalidInput);
					}
					b[..value.len()].copy_from_slice(value);
					Ok(value.len())
				}
				_ => Err(Error::BadAddress),
			}
		})?;
		fctx.fc_output = OpOutput::Size(n);
		Ok(())
	}

	fn listxattr(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let inode = subject_inode(fctx)?;
		let n = with_node(&inode, |node| {
			let mut packed: Vec<u8> = Vec::new();
			for name in node.xattrs.keys() {
				packed.extend_from_slice(name.as_bytes());
				packed.push(0);
			}
			match &mut fctx.user_buf {
				UserBuffer::None => Ok(packed.len()),
				UserBuffer::Out(b) => {
					if b.len() < packed.len() {
						return Err(Error::InvalidInput);
					}
					b[..packed.len()].copy_from_slice(&packed);
					Ok(packed.len())
				}
				_ => Err(Error::BadAddress),
			}
		})?;
		fctx.fc_output = OpOutput::Size(n);
		Ok(())
	}

	fn removexattr(&self, fctx: &mut FsContext<'_>) -> Result<()> {
		let inode = subject_inode(fctx)?;
		let name = Self::xattr_name(fctx)?;
		with_node(&inode, |n| {
			n.xattrs.remove(&name).map(|_| ()).ok_or(Error::NoSuchEntry)
		})?;
		inode.touch_ctime();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ram_node_defaults_are_empty() {
		let n = RamNode::default();
		assert!(n.data.is_empty());
		assert!(n.children.is_empty());
		assert!(n.xattrs.is_empty());
		assert!(n.target.is_empty());
	}

	#[test]
	fn fs_descriptor_is_virtual() {
		let fs = RamFs;
		assert_eq!(fs.name(), "ramfs");
		assert!(!fs.fs_flags().contains(FsFlags::REQUIRES_DEV));
		assert!(fs.capabilities().contains(FsCapabilities::ATOMIC_RENAME));
	}
}
