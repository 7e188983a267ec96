use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// 原子写入：先写同目录下的临时文件并 fsync，再 rename 覆盖目标文件
///
/// 进程在写入途中崩溃时，目标文件要么是旧内容，要么是新内容，不会是半截文件。
/// 每次调用使用独立命名的临时文件，多个保存同时进行也互不干扰，最后一次 rename 生效。
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // rename 之后同步目录项，保证掉电后新文件名可见
    #[cfg(unix)]
    if let Ok(d) = std::fs::File::open(dir) {
        let _ = d.sync_all();
    }

    Ok(())
}
