use serde::{Deserialize, Serialize};

/// Profile stored in the users collection, keyed by the auth identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "phoneNumber", alias = "phone", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub country: String,
    /// Favorite recipe ids; written only through the favorites API
    #[serde(default, skip_serializing)]
    pub favorites: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_without_optional_fields() {
        let profile: UserProfile = serde_json::from_value(json!({
            "uid": "u1",
            "name": "Ada",
            "email": "ada@example.com",
            "address": "1 Main St",
            "country": "UK"
        }))
        .unwrap();
        assert!(profile.phone.is_none());
        assert!(profile.favorites.is_empty());
    }

    #[test]
    fn test_serialize_never_writes_favorites() {
        let profile = UserProfile {
            uid: "u1".into(),
            phone: Some("+44 7700 900000".into()),
            favorites: vec!["r1".into()],
            ..Default::default()
        };
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["phoneNumber"], "+44 7700 900000");
        assert!(value.get("favorites").is_none());
    }
}
