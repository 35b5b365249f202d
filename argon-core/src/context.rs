use chrono::NaiveDateTime;

use crate::backend::GeoPoint;

/// Prefixes `text` with the current date, time and, if known, location.
///
/// Dates and times use the en-US layout (`10/16/2026`, `3:04:05 PM`).
pub fn contextualize(text: &str, now: NaiveDateTime, location: Option<GeoPoint>) -> String {
    let mut query = format!(
        "Current date: {}. Current time: {}. ",
        now.format("%-m/%-d/%Y"),
        now.format("%-I:%M:%S %p"),
    );
    if let Some(point) = location {
        query.push_str(&format!(
            "User location: {}, {}. ",
            point.latitude, point.longitude
        ));
    }
    query.push_str("User query: ");
    query.push_str(text);
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn afternoon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 7)
            .unwrap()
            .and_hms_opt(15, 4, 5)
            .unwrap()
    }

    #[test]
    fn header_without_location() {
        assert_eq!(
            contextualize("hello", afternoon(), None),
            "Current date: 3/7/2026. Current time: 3:04:05 PM. User query: hello"
        );
    }

    #[test]
    fn header_with_location() {
        let point = GeoPoint {
            latitude: 48.8566,
            longitude: 2.3522,
        };
        assert_eq!(
            contextualize("cafes nearby", afternoon(), Some(point)),
            "Current date: 3/7/2026. Current time: 3:04:05 PM. \
             User location: 48.8566, 2.3522. User query: cafes nearby"
        );
    }
}
