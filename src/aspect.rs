use std::fmt::Display;

/// Storage category derived from a video's aspect ratio
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AspectCategory {
    Horizontal,
    Portrait,
    Other,
}

/// A width:height ratio in lowest terms
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Ratio {
    width: u64,
    height: u64,
}

impl AspectCategory {
    pub(crate) const fn prefix(self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Portrait => "portrait",
            Self::Other => "other",
        }
    }

    fn from_ratio(ratio: &str) -> Self {
        match ratio {
            "16:9" => Self::Horizontal,
            "9:16" => Self::Portrait,
            _ => Self::Other,
        }
    }
}

impl Display for AspectCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

impl Display for Ratio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

const fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }

    a
}

/// Reduce dimensions to lowest terms, or `None` if either is not positive
pub(crate) fn reduce(width: i64, height: i64) -> Option<Ratio> {
    if width <= 0 || height <= 0 {
        return None;
    }

    let (width, height) = (width as u64, height as u64);
    let divisor = gcd(width, height);

    Some(Ratio {
        width: width / divisor,
        height: height / divisor,
    })
}

pub(crate) fn classify(width: i64, height: i64) -> AspectCategory {
    match reduce(width, height) {
        Some(ratio) => AspectCategory::from_ratio(&ratio.to_string()),
        None => AspectCategory::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, gcd, reduce, AspectCategory};

    #[test]
    fn common_sizes() {
        assert_eq!(classify(1920, 1080), AspectCategory::Horizontal);
        assert_eq!(classify(1280, 720), AspectCategory::Horizontal);
        assert_eq!(classify(1080, 1920), AspectCategory::Portrait);
        assert_eq!(classify(720, 1280), AspectCategory::Portrait);
        assert_eq!(classify(1000, 1000), AspectCategory::Other);
        assert_eq!(classify(640, 480), AspectCategory::Other);
        assert_eq!(classify(2560, 1080), AspectCategory::Other);
    }

    #[test]
    fn near_misses_are_other() {
        // 1366x768 is marketed as 16:9 but reduces to 683:384
        assert_eq!(classify(1366, 768), AspectCategory::Other);
        assert_eq!(classify(1920, 1081), AspectCategory::Other);
    }

    #[test]
    fn non_positive_dimensions_are_other() {
        for (width, height) in [(0, 0), (0, 1080), (1920, 0), (-1920, 1080), (1920, -1080)] {
            assert_eq!(reduce(width, height), None);
            assert_eq!(classify(width, height), AspectCategory::Other);
        }
    }

    #[test]
    fn reduced_ratio_is_coprime() {
        for width in 1..=120 {
            for height in 1..=120 {
                let ratio = reduce(width, height).expect("Positive dimensions");

                assert_eq!(gcd(ratio.width, ratio.height), 1, "{width}x{height}");
                assert_eq!(
                    ratio.width * height as u64,
                    ratio.height * width as u64,
                    "{width}x{height}"
                );
            }
        }
    }

    #[test]
    fn classification_ignores_scale() {
        for (width, height) in [(16, 9), (9, 16), (4, 3), (1, 1), (21, 9), (7, 5)] {
            let expected = classify(width, height);

            for k in 1..=240 {
                assert_eq!(classify(width * k, height * k), expected, "{k}x{width}:{height}");
            }
        }
    }

    #[test]
    fn ratio_format() {
        assert_eq!(reduce(1920, 1080).unwrap().to_string(), "16:9");
        assert_eq!(reduce(1080, 1920).unwrap().to_string(), "9:16");
        assert_eq!(reduce(1000, 1000).unwrap().to_string(), "1:1");
    }

    #[test]
    fn prefixes() {
        assert_eq!(AspectCategory::Horizontal.prefix(), "horizontal");
        assert_eq!(AspectCategory::Portrait.prefix(), "portrait");
        assert_eq!(AspectCategory::Other.to_string(), "other");
    }
}
