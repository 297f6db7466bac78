use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Free-text fields absent from the conversation are written to the CRM with
/// this placeholder; the CRM schema expects every field to carry a string.
pub const NOT_SPECIFIED: &str = "Not specified";
/// Numeric-ish fields use a blank marker instead of prose.
pub const BLANK: &str = " ";

pub const CONTACT_CHANNEL_VALUE: &str = "AI Chatbot";
pub const LEAD_SOURCE_TAG_VALUE: &str = "Website";
pub const LEAD_SOURCE_VALUE: &str = "Our Website";

/// Complete field map at the CRM-write boundary. Every canonical key is
/// always present; sentinels fill the gaps.
pub type CrmFieldMap = BTreeMap<String, String>;

/// Structured profile extracted from a session transcript. Absence is a real
/// `None` here; sentinel strings exist only in [`FieldSnapshot::to_crm_fields`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country_code: Option<String>,
    pub age: Option<u8>,
    pub marital_status: Option<String>,
    pub work_experience: Option<String>,
    pub education: Option<String>,
    pub nationality: Option<String>,
    pub visa_status: Option<String>,
    pub current_location: Option<String>,
    pub future_location: Option<String>,
    pub specialization: Option<String>,
    pub profession: Option<String>,
    pub referral_channel: Option<String>,
}

impl FieldSnapshot {
    /// The qualification predicate: some name, an email, and a phone number.
    pub fn has_contact_info(&self) -> bool {
        (self.first_name.is_some() || self.last_name.is_some())
            && self.email.is_some()
            && self.phone.is_some()
    }

    /// The CRM schema requires a last name. A single-token name is promoted
    /// from first to last before any CRM write.
    pub fn promote_single_name(&mut self) {
        if self.last_name.is_none() {
            self.last_name = self.first_name.take();
        }
    }

    /// Renders the snapshot as the complete CRM field map: every canonical key
    /// present, absent values replaced by sentinels, constant source fields
    /// appended.
    pub fn to_crm_fields(&self) -> CrmFieldMap {
        fn text(value: &Option<String>) -> String {
            value.clone().unwrap_or_else(|| NOT_SPECIFIED.to_string())
        }

        let mut fields = CrmFieldMap::new();
        fields.insert("FirstName".to_string(), text(&self.first_name));
        fields.insert("LastName".to_string(), text(&self.last_name));
        fields.insert("Email".to_string(), text(&self.email));
        fields.insert("Phone".to_string(), text(&self.phone));
        fields.insert(
            "Age__c".to_string(),
            self.age.map(|age| age.to_string()).unwrap_or_else(|| BLANK.to_string()),
        );
        fields.insert("Marital_Status__c".to_string(), text(&self.marital_status));
        fields.insert("Work_Experience__c".to_string(), text(&self.work_experience));
        fields.insert(
            "Highest_Education__c".to_string(),
            self.education.clone().unwrap_or_else(|| BLANK.to_string()),
        );
        fields.insert("Nationality__c".to_string(), text(&self.nationality));
        fields.insert("Visa_Status__c".to_string(), text(&self.visa_status));
        fields.insert("Current_Location__c".to_string(), text(&self.current_location));
        fields.insert("Future_Location__c".to_string(), text(&self.future_location));
        fields.insert("Specialization__c".to_string(), text(&self.specialization));
        fields.insert("Profession__c".to_string(), text(&self.profession));
        fields.insert("Referral_Channel__c".to_string(), text(&self.referral_channel));
        fields.insert("Contact_Channel__c".to_string(), CONTACT_CHANNEL_VALUE.to_string());
        fields.insert("Lead_Source_Tag__c".to_string(), LEAD_SOURCE_TAG_VALUE.to_string());
        fields.insert("LeadSource".to_string(), LEAD_SOURCE_VALUE.to_string());
        fields
    }
}
