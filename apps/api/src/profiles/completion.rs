use serde::{Deserialize, Serialize};

use crate::models::profile::{AddressRow, ProfileRow, ServiceRow};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Profile,
    Address,
    Services,
}

#[derive(Debug, Clone, Copy)]
pub struct WeightedField {
    pub field: &'static str,
    pub weight: u32,
    pub source: FieldSource,
}

const fn weighted(field: &'static str, weight: u32, source: FieldSource) -> WeightedField {
    WeightedField {
        field,
        weight,
        source,
    }
}

/// Fields that count toward completion, with their importance.
pub const COMPLETION_FIELDS: &[WeightedField] = &[
    weighted("first_name", 2, FieldSource::Profile),
    weighted("last_name", 2, FieldSource::Profile),
    weighted("email", 2, FieldSource::Profile),
    weighted("phone", 2, FieldSource::Profile),
    weighted("bio", 1, FieldSource::Profile),
    weighted("profile_picture", 1, FieldSource::Profile),
    weighted("gender", 1, FieldSource::Profile),
    weighted("address_line", 1, FieldSource::Address),
    weighted("city", 1, FieldSource::Address),
    weighted("state", 1, FieldSource::Address),
    weighted("pincode", 1, FieldSource::Address),
    weighted("services", 2, FieldSource::Services),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionReport {
    /// 0–100. Also 0 when the profile is not loaded; callers tell those apart by other means.
    pub percentage: u8,
    pub filled_weight: u32,
    pub total_weight: u32,
    pub missing_fields: Vec<String>,
}

fn is_filled(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

fn profile_value<'a>(profile: &'a ProfileRow, field: &str) -> Option<&'a str> {
    match field {
        "first_name" => profile.first_name.as_deref(),
        "last_name" => profile.last_name.as_deref(),
        "email" => profile.email.as_deref(),
        "phone" => profile.phone.as_deref(),
        "bio" => profile.bio.as_deref(),
        "profile_picture" => profile.profile_picture.as_deref(),
        "gender" => profile.gender.as_deref(),
        _ => None,
    }
}

fn address_value<'a>(address: &'a AddressRow, field: &str) -> Option<&'a str> {
    match field {
        "address_line" => address.address_line.as_deref(),
        "city" => address.city.as_deref(),
        "state" => address.state.as_deref(),
        "pincode" => address.pincode.as_deref(),
        _ => None,
    }
}

pub fn compute_completion(
    profile: Option<&ProfileRow>,
    address: Option<&AddressRow>,
    services: &[ServiceRow],
) -> CompletionReport {
    let total_weight: u32 = COMPLETION_FIELDS.iter().map(|f| f.weight).sum();

    let Some(profile) = profile else {
        return CompletionReport {
            percentage: 0,
            filled_weight: 0,
            total_weight,
            missing_fields: COMPLETION_FIELDS
                .iter()
                .map(|f| f.field.to_string())
                .collect(),
        };
    };

    let mut filled_weight = 0;
    let mut missing_fields = Vec::new();

    for entry in COMPLETION_FIELDS {
        let filled = match entry.source {
            FieldSource::Profile => is_filled(profile_value(profile, entry.field)),
            FieldSource::Address => {
                is_filled(address.and_then(|a| address_value(a, entry.field)))
            }
            FieldSource::Services => services
                .iter()
                .any(|s| !s.service_name.trim().is_empty()),
        };
        if filled {
            filled_weight += entry.weight;
        } else {
            missing_fields.push(entry.field.to_string());
        }
    }

    let percentage = if total_weight > 0 {
        (100.0 * filled_weight as f64 / total_weight as f64)
            .round()
            .clamp(0.0, 100.0) as u8
    } else {
        0
    };

    CompletionReport {
        percentage,
        filled_weight,
        total_weight,
        missing_fields,
    }
}
