//! Canonical forms for raw OCR substrings.
//!
//! Every normalizer is total: input that cannot be canonicalized comes back
//! unchanged so a partially readable value still reaches the reviewer.

/// Canonicalize a date to `YYYY-MM-DD`.
///
/// Accepts `/` or `-` separated triples. A four-digit first part is read as
/// year-month-day. Otherwise the year is last; two-digit years expand to
/// `20YY` below 30 and `19YY` from 30. A first part above 12 must be the day
/// (DD/MM/YYYY), a second part above 12 must be the day (MM/DD/YYYY), and an
/// ambiguous pair defaults to MM/DD/YYYY.
pub fn normalize_date(raw: &str) -> String {
    canonical_date(raw.trim()).unwrap_or_else(|| raw.to_string())
}

fn canonical_date(s: &str) -> Option<String> {
    let parts: Vec<&str> = s.split(['/', '-']).collect();
    if parts.len() != 3 {
        return None;
    }

    let (year, month, day) = if parts[0].len() == 4 {
        (number(parts[0])?, number(parts[1])?, number(parts[2])?)
    } else {
        let first = number(parts[0])?;
        let second = number(parts[1])?;
        let mut year = number(parts[2])?;
        if year < 100 {
            year += if year < 30 { 2000 } else { 1900 };
        }

        if first > 12 {
            (year, second, first)
        } else {
            // Second part above 12 and the ambiguous case both read as MM/DD.
            (year, first, second)
        }
    };

    let valid = (1..=12).contains(&month)
        && (1..=31).contains(&day)
        && (1900..=2100).contains(&year);
    if !valid {
        return None;
    }

    Some(format!("{year:04}-{month:02}-{day:02}"))
}

fn number(part: &str) -> Option<u32> {
    if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Format a ten-digit phone number as `(NNN) NNN-NNNN`.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 10 {
        return raw.to_string();
    }
    format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..10])
}

/// Map `m`/`male` and `f`/`female` (any case) to `male`/`female`.
pub fn normalize_gender(raw: &str) -> String {
    match raw.trim().to_lowercase().as_str() {
        "m" | "male" => "male".to_string(),
        "f" | "female" => "female".to_string(),
        _ => raw.to_string(),
    }
}

/// Uppercase the first character and lowercase the rest.
pub fn capitalize_name(raw: &str) -> String {
    let mut chars = raw.trim().chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_part_over_twelve_is_day() {
        assert_eq!(normalize_date("13/05/2020"), "2020-05-13");
    }

    #[test]
    fn second_part_over_twelve_is_day() {
        assert_eq!(normalize_date("05/13/2020"), "2020-05-13");
    }

    #[test]
    fn ambiguous_date_defaults_to_month_first() {
        assert_eq!(normalize_date("05/06/2020"), "2020-05-06");
    }

    #[test]
    fn iso_dates_pass_through_padded() {
        assert_eq!(normalize_date("1985-03-07"), "1985-03-07");
        assert_eq!(normalize_date("1985-3-7"), "1985-03-07");
    }

    #[test]
    fn two_digit_years_expand_around_thirty() {
        assert_eq!(normalize_date("01/02/29"), "2029-01-02");
        assert_eq!(normalize_date("01/02/30"), "1930-01-02");
        assert_eq!(normalize_date("12-25-85"), "1985-12-25");
    }

    #[test]
    fn iso_output_is_idempotent() {
        for raw in ["13/05/2020", "05/13/2020", "05/06/2020", "1999-12-31", "7/4/76"] {
            let once = normalize_date(raw);
            assert_eq!(normalize_date(&once), once, "not idempotent for {raw}");
        }
    }

    #[test]
    fn invalid_dates_return_raw_input() {
        assert_eq!(normalize_date("13/13/2020"), "13/13/2020");
        assert_eq!(normalize_date("05/06/1850"), "05/06/1850");
        assert_eq!(normalize_date("2020-13-01"), "2020-13-01");
        assert_eq!(normalize_date("March 5 2020"), "March 5 2020");
        assert_eq!(normalize_date("05/06"), "05/06");
        assert_eq!(normalize_date("ab/cd/efgh"), "ab/cd/efgh");
    }

    #[test]
    fn phone_with_ten_digits_is_formatted() {
        assert_eq!(normalize_phone("555.123.4567"), "(555) 123-4567");
        assert_eq!(normalize_phone("(555) 123 4567"), "(555) 123-4567");
        assert_eq!(normalize_phone("555-123-4567"), "(555) 123-4567");
    }

    #[test]
    fn phone_without_ten_digits_is_unchanged() {
        assert_eq!(normalize_phone("12345"), "12345");
        assert_eq!(normalize_phone("1-555-123-4567"), "1-555-123-4567");
    }

    #[test]
    fn gender_maps_common_spellings() {
        assert_eq!(normalize_gender("M"), "male");
        assert_eq!(normalize_gender("Female"), "female");
        assert_eq!(normalize_gender("f"), "female");
        assert_eq!(normalize_gender("non-binary"), "non-binary");
    }

    #[test]
    fn names_are_capitalized_regardless_of_ocr_case() {
        assert_eq!(capitalize_name("JOHN"), "John");
        assert_eq!(capitalize_name("john"), "John");
        assert_eq!(capitalize_name("mCdONALD"), "Mcdonald");
        assert_eq!(capitalize_name(""), "");
    }
}
