//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 文件系统接口
//!
//! 每个执行实体有私有的文件描述符表，表项是外部文件系统的引用计数句柄。
//! 线程创建时复制句柄（`dup`），底层文件对象仍然共享。

/// 打开文件句柄
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FileRef(pub usize);

/// 索引节点句柄（工作目录）
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct InodeRef(pub usize);

/// 外部文件系统
///
/// 实现可能在内核自旋锁持有期间被调用，不得阻塞，也不得回调调度器
pub trait Vfs: Send + Sync {
    /// 对应 xv6 的 filedup()
    fn dup(&self, file: FileRef) -> FileRef;

    /// 对应 xv6 的 fileclose()
    fn close(&self, file: FileRef);

    /// 增加索引节点引用
    fn idup(&self, inode: InodeRef) -> InodeRef;

    /// 释放索引节点引用
    fn iput(&self, inode: InodeRef);

    /// 根目录
    fn root(&self) -> InodeRef;
}
