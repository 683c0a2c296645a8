//! Text Chunking Module
//!
//! 페이지 텍스트를 겹치는 단어 윈도우로 분할합니다.
//! 각 윈도우가 하나의 검색 단위(청크)가 됩니다.

/// 최소 콘텐츠 길이 (문자 수). 이 길이 이하의 청크/페이지는 버립니다.
pub const MIN_CONTENT_LENGTH: usize = 50;

/// 기본 윈도우 크기 (단어 수)
pub const DEFAULT_WINDOW_SIZE: usize = 500;

/// 기본 오버랩 (단어 수)
pub const DEFAULT_OVERLAP: usize = 100;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 윈도우 크기 (단어 수)
    pub window_size: usize,
    /// 연속 윈도우 간 오버랩 (단어 수)
    pub overlap: usize,
    /// 최소 콘텐츠 길이 (문자 수, 초과해야 유지)
    pub min_content_length: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: DEFAULT_OVERLAP,
            min_content_length: MIN_CONTENT_LENGTH,
        }
    }
}

impl ChunkConfig {
    /// 짧은 문맥 위주 설정 (FAQ, 문서 조각)
    pub fn for_precision() -> Self {
        Self {
            window_size: 200,
            overlap: 40,
            min_content_length: MIN_CONTENT_LENGTH,
        }
    }

    /// 오버랩 없는 빠른 인덱싱 설정
    pub fn for_fast() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: 0,
            min_content_length: MIN_CONTENT_LENGTH,
        }
    }

    /// 윈도우 간 이동 폭 (항상 1 이상)
    pub fn step(&self) -> usize {
        self.window_size.max(1).saturating_sub(self.overlap).max(1)
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// WordWindowChunker
// ============================================================================

/// 단어 윈도우 청커
///
/// 공백 기준으로 토큰화한 뒤 `window_size` 단어씩 잘라내고
/// `window_size - overlap` 단어씩 전진합니다.
pub struct WordWindowChunker {
    config: ChunkConfig,
}

impl WordWindowChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성 (500 단어 / 100 오버랩)
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }
}

impl Chunker for WordWindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        split_with(text, &self.config)
    }

    fn name(&self) -> &'static str {
        "WordWindowChunker"
    }
}

// ============================================================================
// Split Functions
// ============================================================================

/// 텍스트를 겹치는 단어 윈도우로 분할 (기본 최소 길이 적용)
pub fn split(text: &str, window_size: usize, overlap: usize) -> Vec<String> {
    split_with(
        text,
        &ChunkConfig {
            window_size,
            overlap,
            min_content_length: MIN_CONTENT_LENGTH,
        },
    )
}

/// 설정 기반 분할
///
/// 윈도우가 텍스트 끝에 닿으면 멈춥니다. 마지막 부분 윈도우를 포함한
/// 모든 윈도우는 최소 길이를 넘을 때만 유지됩니다.
pub fn split_with(text: &str, config: &ChunkConfig) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return vec![];
    }

    let window = config.window_size.max(1);
    let step = config.step();

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + window).min(words.len());
        let chunk = words[start..end].join(" ");

        if exceeds_min_length(&chunk, config.min_content_length) {
            chunks.push(chunk);
        }

        if end >= words.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// 트림된 문자 수가 최소 길이를 초과하는지
#[inline]
pub fn exceeds_min_length(text: &str, min_length: usize) -> bool {
    text.trim().chars().count() > min_length
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(WordWindowChunker::with_defaults())
}

/// 단어 윈도우 청커 생성 (설정 지정)
pub fn word_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(WordWindowChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(count: usize) -> String {
        (0..count)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_split_empty() {
        assert!(split("", 500, 100).is_empty());
        assert!(split("   \n\t  ", 500, 100).is_empty());
    }

    #[test]
    fn test_split_short_text_below_threshold() {
        let chunks = split("too short to keep", 500, 100);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_split_short_text_single_chunk() {
        let text = "Our return policy allows refunds within 30 days of purchase for any item.";
        let chunks = split(text, 500, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn test_split_overlap_windows() {
        let text = numbered_words(1200);
        let chunks = split(&text, 500, 100);
        assert_eq!(chunks.len(), 3);

        let first: Vec<&str> = chunks[0].split(' ').collect();
        let second: Vec<&str> = chunks[1].split(' ').collect();
        let third: Vec<&str> = chunks[2].split(' ').collect();

        assert_eq!(first.len(), 500);
        assert_eq!(first[0], "w0");
        assert_eq!(first[499], "w499");

        assert_eq!(second.len(), 500);
        assert_eq!(second[0], "w400");
        assert_eq!(second[499], "w899");

        assert_eq!(third.len(), 400);
        assert_eq!(third[0], "w800");
        assert_eq!(third[399], "w1199");
    }

    #[test]
    fn test_split_deterministic() {
        let text = numbered_words(777);
        assert_eq!(split(&text, 500, 100), split(&text, 500, 100));
    }

    #[test]
    fn test_split_normalizes_whitespace() {
        let text = "alpha\n\nbeta\tgamma   delta epsilon zeta eta theta iota kappa lambda";
        let chunks = split(text, 500, 100);
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].contains('\n'));
        assert!(chunks[0].starts_with("alpha beta gamma"));
    }

    #[test]
    fn test_split_drops_short_tail() {
        // 마지막 윈도우 "w8 w9"는 최소 길이 미달
        let config = ChunkConfig {
            window_size: 4,
            overlap: 0,
            min_content_length: 8,
        };
        let text = "w000 w111 w222 w333 w444 w555 w666 w777 w8 w9";
        let chunks = split_with(text, &config);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], "w444 w555 w666 w777");
    }

    #[test]
    fn test_overlap_larger_than_window_still_advances() {
        let config = ChunkConfig {
            window_size: 3,
            overlap: 10,
            min_content_length: 0,
        };
        assert_eq!(config.step(), 1);
        let chunks = split_with("a b c d", &config);
        assert_eq!(chunks, vec!["a b c", "b c d"]);
    }

    #[test]
    fn test_config_presets() {
        let default = ChunkConfig::default();
        assert_eq!(default.window_size, 500);
        assert_eq!(default.overlap, 100);
        assert_eq!(default.step(), 400);

        let fast = ChunkConfig::for_fast();
        assert_eq!(fast.overlap, 0);
        assert_eq!(fast.step(), 500);

        assert_eq!(ChunkConfig::for_precision().window_size, 200);
    }

    #[test]
    fn test_chunker_trait() {
        let chunker = default_chunker();
        assert_eq!(chunker.name(), "WordWindowChunker");
        assert_eq!(chunker.chunk(&numbered_words(1200)).len(), 3);
    }
}
