//! In-memory filtering and sorting for a CA's contact-request inbox.
//!
//! Search and every populated filter dimension are ANDed together; an empty
//! dimension places no constraint. Sorting is stable so equal keys keep their
//! incoming order.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;

use crate::models::contact_request::{ContactPreference, ContactRequest, RequestStatus, Urgency};

/// Raw date bounds as typed by the user. Unparsable bounds are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestFilter {
    #[serde(default)]
    pub status: Vec<RequestStatus>,
    #[serde(default)]
    pub urgency: Vec<Urgency>,
    #[serde(default)]
    pub contact_preference: Vec<ContactPreference>,
    #[serde(default)]
    pub service_needed: Vec<String>,
    #[serde(default)]
    pub date_range: DateRange,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    CustomerName,
    Subject,
    ServiceNeeded,
    Status,
    Urgency,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(SortField::CreatedAt),
            "updated_at" => Ok(SortField::UpdatedAt),
            "customer_name" => Ok(SortField::CustomerName),
            "subject" => Ok(SortField::Subject),
            "service_needed" => Ok(SortField::ServiceNeeded),
            "status" => Ok(SortField::Status),
            "urgency" => Ok(SortField::Urgency),
            other => Err(format!("cannot sort by '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

#[derive(Clone, Copy)]
enum BoundKind {
    Start,
    End,
}

/// Accepts RFC 3339 timestamps or `YYYY-MM-DD`. A date-only end bound covers the whole day.
fn parse_bound(raw: Option<&str>, kind: BoundKind) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let time = match kind {
        BoundKind::Start => NaiveTime::MIN,
        BoundKind::End => NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)?,
    };
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

struct CompiledFilter<'a> {
    filter: &'a RequestFilter,
    search: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl<'a> CompiledFilter<'a> {
    fn new(filter: &'a RequestFilter) -> Self {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        Self {
            filter,
            search,
            from: parse_bound(filter.date_range.from.as_deref(), BoundKind::Start),
            to: parse_bound(filter.date_range.to.as_deref(), BoundKind::End),
        }
    }

    fn matches(&self, r: &ContactRequest) -> bool {
        if let Some(term) = &self.search {
            let hit = [
                &r.customer_name,
                &r.subject,
                &r.message,
                &r.service_needed,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(term.as_str()));
            if !hit {
                return false;
            }
        }

        let f = self.filter;
        if !f.status.is_empty() && !f.status.contains(&r.status) {
            return false;
        }
        if !f.urgency.is_empty() && !f.urgency.contains(&r.urgency) {
            return false;
        }
        if !f.contact_preference.is_empty() && !f.contact_preference.contains(&r.contact_preference)
        {
            return false;
        }
        if !f.service_needed.is_empty()
            && !f
                .service_needed
                .iter()
                .any(|s| s.trim().eq_ignore_ascii_case(r.service_needed.trim()))
        {
            return false;
        }

        if self.from.is_some_and(|from| r.created_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| r.created_at > to) {
            return false;
        }
        true
    }
}

/// Case-folded comparison with a raw tiebreak, so "abc" and "ABC" still order deterministically.
fn locale_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn compare(a: &ContactRequest, b: &ContactRequest, field: SortField) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::CustomerName => locale_cmp(&a.customer_name, &b.customer_name),
        SortField::Subject => locale_cmp(&a.subject, &b.subject),
        SortField::ServiceNeeded => locale_cmp(&a.service_needed, &b.service_needed),
        SortField::Status => a.status.rank().cmp(&b.status.rank()),
        SortField::Urgency => a.urgency.priority().cmp(&b.urgency.priority()),
    }
}

pub fn sort_requests(records: &mut [ContactRequest], sort: SortSpec) {
    // slice::sort_by is stable
    records.sort_by(|a, b| {
        let ord = compare(a, b, sort.field);
        match sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}

pub fn filter_requests(records: Vec<ContactRequest>, filter: &RequestFilter) -> Vec<ContactRequest> {
    let compiled = CompiledFilter::new(filter);
    records.into_iter().filter(|r| compiled.matches(r)).collect()
}

/// Filters then sorts; the view the inbox renders before paging.
pub fn filter_and_sort(
    records: Vec<ContactRequest>,
    filter: &RequestFilter,
    sort: SortSpec,
) -> Vec<ContactRequest> {
    let mut out = filter_requests(records, filter);
    sort_requests(&mut out, sort);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn make_request(
        name: &str,
        subject: &str,
        urgency: Urgency,
        status: RequestStatus,
        days_ago: i64,
    ) -> ContactRequest {
        let created = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap() - Duration::days(days_ago);
        ContactRequest {
            id: Uuid::new_v4(),
            ca_id: Uuid::nil(),
            customer_id: None,
            customer_name: name.to_string(),
            customer_email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            customer_phone: None,
            subject: subject.to_string(),
            message: "Looking for assistance".to_string(),
            service_needed: "Tax Filing".to_string(),
            urgency,
            contact_preference: ContactPreference::Email,
            status,
            ca_notes: None,
            replied_at: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn sample() -> Vec<ContactRequest> {
        let mut gst = make_request(
            "Priya Shah",
            "Need help with GST Registration",
            Urgency::Immediately,
            RequestStatus::New,
            1,
        );
        gst.service_needed = "GST".to_string();
        gst.contact_preference = ContactPreference::Phone;

        vec![
            gst,
            make_request(
                "arjun mehta",
                "Annual audit",
                Urgency::ThisMonth,
                RequestStatus::Replied,
                10,
            ),
            make_request(
                "Zoya Khan",
                "ITR for freelancers",
                Urgency::Flexible,
                RequestStatus::New,
                40,
            ),
            make_request(
                "Bina Das",
                "Company incorporation",
                Urgency::WithinAWeek,
                RequestStatus::Ignored,
                5,
            ),
        ]
    }

    fn ids(records: &[ContactRequest]) -> HashSet<Uuid> {
        records.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        for term in ["gst", "GST", "registration"] {
            let filter = RequestFilter {
                search: Some(term.to_string()),
                ..Default::default()
            };
            let out = filter_requests(sample(), &filter);
            assert_eq!(out.len(), 1, "term {term}");
            assert_eq!(out[0].subject, "Need help with GST Registration");
        }
    }

    #[test]
    fn test_search_matches_any_field() {
        let filter = RequestFilter {
            search: Some("MEHTA".to_string()),
            ..Default::default()
        };
        let out = filter_requests(sample(), &filter);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].customer_name, "arjun mehta");
    }

    #[test]
    fn test_blank_search_places_no_constraint() {
        let filter = RequestFilter {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(filter_requests(sample(), &filter).len(), 4);
    }

    #[test]
    fn test_filter_composition_is_intersection() {
        let status_only = RequestFilter {
            status: vec![RequestStatus::New],
            ..Default::default()
        };
        let urgency_only = RequestFilter {
            urgency: vec![Urgency::Immediately, Urgency::Flexible, Urgency::ThisMonth],
            ..Default::default()
        };
        let pref_only = RequestFilter {
            contact_preference: vec![ContactPreference::Email],
            ..Default::default()
        };
        let combined = RequestFilter {
            status: status_only.status.clone(),
            urgency: urgency_only.urgency.clone(),
            contact_preference: pref_only.contact_preference.clone(),
            ..Default::default()
        };

        let records = sample();
        let a = ids(&filter_requests(records.clone(), &status_only));
        let b = ids(&filter_requests(records.clone(), &urgency_only));
        let c = ids(&filter_requests(records.clone(), &pref_only));
        let expected: HashSet<Uuid> = a
            .intersection(&b)
            .copied()
            .filter(|id| c.contains(id))
            .collect();
        let actual = ids(&filter_requests(records, &combined));

        assert_eq!(actual, expected);
        assert_eq!(actual.len(), 1);
    }

    #[test]
    fn test_service_filter_is_case_insensitive() {
        let filter = RequestFilter {
            service_needed: vec!["gst".to_string()],
            ..Default::default()
        };
        let out = filter_requests(sample(), &filter);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].service_needed, "GST");
    }

    #[test]
    fn test_date_range_bounds() {
        let filter = RequestFilter {
            date_range: DateRange {
                from: Some("2024-06-20".to_string()),
                to: Some("2024-06-29".to_string()),
            },
            ..Default::default()
        };
        let out = filter_requests(sample(), &filter);
        let names: HashSet<&str> = out.iter().map(|r| r.customer_name.as_str()).collect();
        assert_eq!(names, HashSet::from(["Priya Shah", "arjun mehta", "Bina Das"]));
    }

    #[test]
    fn test_date_only_upper_bound_covers_whole_day() {
        // Priya's request is at 2024-06-29T12:00Z
        let filter = RequestFilter {
            date_range: DateRange {
                from: None,
                to: Some("2024-06-29".to_string()),
            },
            ..Default::default()
        };
        let out = filter_requests(sample(), &filter);
        assert!(out.iter().any(|r| r.customer_name == "Priya Shah"));
    }

    #[test]
    fn test_unparsable_bound_is_no_constraint() {
        let filter = RequestFilter {
            date_range: DateRange {
                from: Some("not-a-date".to_string()),
                to: Some("2024-13-45".to_string()),
            },
            ..Default::default()
        };
        assert_eq!(filter_requests(sample(), &filter).len(), 4);
    }

    #[test]
    fn test_rfc3339_bound() {
        let filter = RequestFilter {
            date_range: DateRange {
                from: Some("2024-06-25T00:00:00+05:30".to_string()),
                to: None,
            },
            ..Default::default()
        };
        let out = filter_requests(sample(), &filter);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_urgency_sorts_by_business_priority() {
        let records = vec![
            make_request("a", "s", Urgency::Flexible, RequestStatus::New, 0),
            make_request("b", "s", Urgency::Immediately, RequestStatus::New, 0),
            make_request("c", "s", Urgency::ThisMonth, RequestStatus::New, 0),
        ];
        let sorted = filter_and_sort(
            records,
            &RequestFilter::default(),
            SortSpec {
                field: SortField::Urgency,
                direction: SortDirection::Asc,
            },
        );
        let order: Vec<Urgency> = sorted.iter().map(|r| r.urgency).collect();
        assert_eq!(
            order,
            vec![Urgency::Immediately, Urgency::ThisMonth, Urgency::Flexible]
        );
    }

    #[test]
    fn test_descending_flips_order() {
        let sorted = filter_and_sort(
            sample(),
            &RequestFilter::default(),
            SortSpec {
                field: SortField::Urgency,
                direction: SortDirection::Desc,
            },
        );
        assert_eq!(sorted.first().unwrap().urgency, Urgency::Flexible);
        assert_eq!(sorted.last().unwrap().urgency, Urgency::Immediately);
    }

    #[test]
    fn test_name_sort_ignores_case() {
        let sorted = filter_and_sort(
            sample(),
            &RequestFilter::default(),
            SortSpec {
                field: SortField::CustomerName,
                direction: SortDirection::Asc,
            },
        );
        let names: Vec<&str> = sorted.iter().map(|r| r.customer_name.as_str()).collect();
        assert_eq!(names, vec!["arjun mehta", "Bina Das", "Priya Shah", "Zoya Khan"]);
    }

    #[test]
    fn test_default_sort_is_newest_first() {
        let sorted = filter_and_sort(sample(), &RequestFilter::default(), SortSpec::default());
        assert_eq!(sorted[0].customer_name, "Priya Shah");
        assert_eq!(sorted[3].customer_name, "Zoya Khan");
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let records: Vec<ContactRequest> = (0..6)
            .map(|i| make_request(&format!("n{i}"), "s", Urgency::ThisMonth, RequestStatus::New, 0))
            .collect();
        let before: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        for direction in [SortDirection::Asc, SortDirection::Desc] {
            let sorted = filter_and_sort(
                records.clone(),
                &RequestFilter::default(),
                SortSpec {
                    field: SortField::Urgency,
                    direction,
                },
            );
            let after: Vec<Uuid> = sorted.iter().map(|r| r.id).collect();
            assert_eq!(before, after);
        }
    }

    #[test]
    fn test_parse_sort_spec_parts() {
        assert_eq!("urgency".parse::<SortField>().unwrap(), SortField::Urgency);
        assert_eq!("ASC".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert!("message".parse::<SortField>().is_err());
    }
}
