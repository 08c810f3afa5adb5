use serde::{Deserialize, Serialize};

use super::RecordId;

// ============================================================================
// Customer Model
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub postal_code: String,
    pub city: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub company_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "firstname")]
    pub first_name: String,
    #[serde(rename = "lastname")]
    pub last_name: String,
}

/// The locally owned customer record, also the payload of `customer.*` events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: RecordId,
    pub username: String,
    #[serde(rename = "firstname")]
    pub first_name: String,
    #[serde(rename = "lastname")]
    pub last_name: String,
    pub name: String,
    pub address: Address,
    pub profile: Profile,
    pub company: Company,
}

/// Body of a create/replace request from the HTTP layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerInput {
    pub username: String,
    #[serde(rename = "firstname")]
    pub first_name: String,
    #[serde(rename = "lastname")]
    pub last_name: String,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub company: Company,
}

/// Fields of a customer once normalized, before an id is assigned
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub address: Address,
    pub profile: Profile,
    pub company: Company,
}

impl NewCustomer {
    pub fn into_customer(self, id: RecordId) -> Customer {
        Customer {
            id,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
            name: self.name,
            address: self.address,
            profile: self.profile,
            company: self.company,
        }
    }
}

impl CustomerInput {
    /// First name in title case, last name upper-cased, display name
    /// `"<First> <LAST>"`, profile mirroring both.
    pub fn normalize(&self) -> NewCustomer {
        let first_name = title_case(self.first_name.trim());
        let last_name = self.last_name.trim().to_uppercase();

        NewCustomer {
            username: self.username.trim().to_string(),
            name: format!("{} {}", first_name, last_name),
            profile: Profile {
                first_name: first_name.clone(),
                last_name: last_name.clone(),
            },
            first_name,
            last_name,
            address: self.address.clone(),
            company: self.company.clone(),
        }
    }
}

/// Upper-case the first letter of every word, lower-case the rest.
/// Word boundaries are any non-alphanumeric character.
pub fn title_case(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut at_word_start = true;

    for ch in input.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                result.extend(ch.to_uppercase());
            } else {
                result.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            result.push(ch);
            at_word_start = true;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("jean"), "Jean");
        assert_eq!(title_case("jEAN-pierre"), "Jean-Pierre");
        assert_eq!(title_case("marie claire"), "Marie Claire");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_normalize_input() {
        let input = CustomerInput {
            username: " jdoe ".to_string(),
            first_name: "john".to_string(),
            last_name: "Doe".to_string(),
            ..Default::default()
        };

        let customer = input.normalize();
        assert_eq!(customer.username, "jdoe");
        assert_eq!(customer.first_name, "John");
        assert_eq!(customer.last_name, "DOE");
        assert_eq!(customer.name, "John DOE");
        assert_eq!(customer.profile.first_name, "John");
        assert_eq!(customer.profile.last_name, "DOE");
    }

    #[test]
    fn test_customer_wire_field_names() {
        let customer = CustomerInput {
            username: "jdoe".to_string(),
            first_name: "john".to_string(),
            last_name: "doe".to_string(),
            ..Default::default()
        }
        .normalize()
        .into_customer(7);

        let json = serde_json::to_value(&customer).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["firstname"], "John");
        assert_eq!(json["lastname"], "DOE");
        assert_eq!(json["address"]["postalCode"], "");
        assert_eq!(json["company"]["companyName"], "");
    }
}
