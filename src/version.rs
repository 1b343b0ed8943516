//! 점 구분 버전 비교 유틸리티 (외부 크레이트 없이)
//!
//! "1.2.3" 형식의 버전 문자열을 세그먼트 단위로 비교합니다.
//! 숫자로 파싱할 수 없는 세그먼트는 0으로 취급하며, 어떤 입력에도 패닉하지 않습니다.

use std::cmp::Ordering;
use std::fmt;

/// 점으로 구분된 음이 아닌 정수 시퀀스
#[derive(Debug, Clone, Default)]
pub struct DottedVersion {
    segments: Vec<u64>,
}

impl DottedVersion {
    /// 항상 성공한다. 빈 세그먼트나 숫자가 아닌 세그먼트는 0이 된다.
    pub fn parse(s: &str) -> Self {
        let segments = s
            .trim()
            .split('.')
            .map(|seg| seg.trim().parse::<u64>().unwrap_or(0))
            .collect();
        Self { segments }
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// 현재 버전보다 새로운 버전인지 확인
    pub fn is_newer_than(&self, other: &DottedVersion) -> bool {
        self > other
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // 짧은 쪽은 0으로 패딩: "1.2" == "1.2.0"
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DottedVersion {}

/// 두 버전 문자열 비교
pub fn compare(a: &str, b: &str) -> Ordering {
    DottedVersion::parse(a).cmp(&DottedVersion::parse(b))
}

/// `compare`의 부호 반환 버전: -1, 0, 1
pub fn compare_sign(a: &str, b: &str) -> i32 {
    match compare(a, b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// `latest`가 `current`보다 새로운지
pub fn is_newer(latest: &str, current: &str) -> bool {
    compare(latest, current) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_versions() {
        assert_eq!(compare_sign("1.2.3", "1.2.3"), 0);
        assert_eq!(compare_sign("1.2", "1.2.0"), 0);
        assert_eq!(compare_sign("1.2.0.0", "1.2"), 0);
    }

    #[test]
    fn numeric_not_lexicographic() {
        assert_eq!(compare_sign("1.9.0", "1.10.0"), -1);
        assert_eq!(compare_sign("2.0.0", "1.9.9"), 1);
        assert_eq!(compare_sign("1.0.10", "1.0.9"), 1);
    }

    #[test]
    fn antisymmetric() {
        let samples = ["0", "1", "1.0", "1.0.1", "1.2", "1.10", "2.0.0", "10.0.0.1", "0.0.0"];
        for a in samples {
            for b in samples {
                assert_eq!(compare_sign(a, b), -compare_sign(b, a), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn non_numeric_segments_become_zero() {
        assert_eq!(compare_sign("1.x.3", "1.0.3"), 0);
        assert_eq!(compare_sign("", "0"), 0);
        assert_eq!(compare_sign("1..2", "1.0.2"), 0);
        assert_eq!(compare_sign("abc", "0.0.1"), -1);
    }

    #[test]
    fn newer_helper() {
        assert!(is_newer("1.1.0", "1.0.0"));
        assert!(!is_newer("1.0.0", "1.0.0"));
        assert!(!is_newer("1.0.0", "1.0.1"));
        assert!(DottedVersion::parse("3").is_newer_than(&DottedVersion::parse("2.99")));
        assert_eq!(DottedVersion::parse("1.2.3").to_string(), "1.2.3");
    }
}
