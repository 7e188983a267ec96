//! 垃圾种子判定
//!
//! 纯函数，只看文件列表。规则按固定顺序求值，命中第一条即返回：
//!
//! 1. 总大小小于 10 MiB
//! 2. 只有一个文件，是视频，且小于 100 MiB（诱饵/样片）
//! 3. 文件数超过 100，且至少 80% 的文件小于 1 KiB（填充文件洪泛）
//! 4. 任意文件名匹配 BitComet 填充文件命名（大小写不敏感）

use crate::types::FileInfo;

const MIN_TOTAL_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_SINGLE_VIDEO_SIZE_BYTES: u64 = 100 * 1024 * 1024;
const MIN_FILES_FOR_MANY_SMALL: usize = 100;
const SMALL_FILE_SIZE_BYTES: u64 = 1024;
// 80%，用整数比较避免浮点误差
const SMALL_FILES_RATIO: (usize, usize) = (4, 5);
const PADDING_FILE_MARKER: &str = "_____padding_file_";

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "webm", "mov", "flv", "wmv", "mpg", "mpeg", "3gp", "ogv", "ts", "vob",
    "m4v", "f4v", "swf", "rmvb", "rm", "asf",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JunkReason {
    TooSmall,
    SmallSingleVideo,
    SmallFileFlood,
    PaddingFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Junk(JunkReason),
}

pub fn classify(files: &[FileInfo]) -> Verdict {
    // 总大小总是从文件列表累加，不信任元数据里的 length；大小来自对端，饱和相加防溢出
    let total_size = files.iter().fold(0u64, |acc, f| acc.saturating_add(f.size));
    if total_size < MIN_TOTAL_SIZE_BYTES {
        return Verdict::Junk(JunkReason::TooSmall);
    }

    if let [single] = files {
        if is_video_file(single.name()) && single.size < MAX_SINGLE_VIDEO_SIZE_BYTES {
            return Verdict::Junk(JunkReason::SmallSingleVideo);
        }
    }

    if files.len() > MIN_FILES_FOR_MANY_SMALL {
        let small = files
            .iter()
            .filter(|f| f.size < SMALL_FILE_SIZE_BYTES)
            .count();
        let (num, den) = SMALL_FILES_RATIO;
        if small * den >= files.len() * num {
            return Verdict::Junk(JunkReason::SmallFileFlood);
        }
    }

    if files.iter().any(|f| is_padding_file(f.name())) {
        return Verdict::Junk(JunkReason::PaddingFile);
    }

    Verdict::Keep
}

fn is_video_file(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

fn is_padding_file(name: &str) -> bool {
    name.to_ascii_lowercase().contains(PADDING_FILE_MARKER)
}
