//! File names for transferred images.

use chrono::{Local, NaiveDateTime};

/// File name for an image transferred at `at` (local time).
///
/// `IMG_<date>T<hh>-<mm>-<ss>.jpg`: sub-second digits and time zone are
/// dropped and the time separators become hyphens.
pub fn image_file_name(at: NaiveDateTime) -> String {
    format!("IMG_{}.jpg", at.format("%Y-%m-%dT%H-%M-%S"))
}

/// File name for an image transferred now.
pub fn image_file_name_now() -> String {
    image_file_name(Local::now().naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_microseconds_stripped() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_micro_opt(14, 7, 22, 123_456)
            .unwrap();
        assert_eq!(image_file_name(at), "IMG_2024-03-05T14-07-22.jpg");
    }

    #[test]
    fn test_whole_second_keeps_seconds() {
        let at = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        assert_eq!(image_file_name(at), "IMG_2023-12-31T23-59-00.jpg");
    }

    #[test]
    fn test_now_has_expected_shape() {
        let name = image_file_name_now();
        assert!(name.starts_with("IMG_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), "IMG_2024-03-05T14-07-22.jpg".len());
        assert!(!name.contains(':'));
    }
}
