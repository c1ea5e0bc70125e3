//! Per-record-type enumeration of sensitive fields.
//!
//! Each record type lists its sensitive slots exactly once. Sealing and
//! opening both walk the same list, so the two directions cannot drift
//! apart. Everything not listed (ids, timestamps, flags, `hidden`, card
//! `rfid`, login `color`, note `name`) stays plaintext.
//!
//! | slot | seal | open of `""` |
//! |---|---|---|
//! | `Required` | always | missing-field policy |
//! | `NonEmpty` | when non-empty | kept as `""` |
//! | `Optional` | when `Some` and non-empty | kept as `Some("")` |
//! | `Present` | whenever `Some` | kept as `Some("")` |

use keyspace_core::types::{CustomField, LoginItem, PaymentCard, SecureNote, Tag, VaultItem};

/// A mutable handle on one sensitive string.
#[derive(Debug)]
pub enum Slot<'a> {
    /// Always present; encrypted even when empty.
    Required(&'a mut String),
    /// Always present; an empty value is left as is in both directions.
    NonEmpty(&'a mut String),
    /// Absent or empty stays as is in both directions.
    Optional(&'a mut Option<String>),
    /// Encrypted whenever set, even when empty. Absent stays absent.
    Present(&'a mut Option<String>),
}

#[derive(Debug)]
pub struct SensitiveField<'a> {
    /// Dotted wire path, e.g. `loginData.passwordHistory[2].password`
    pub path: String,
    pub slot: Slot<'a>,
}

pub trait EnvelopeSchema {
    fn sensitive_fields(&mut self) -> Vec<SensitiveField<'_>>;
}

#[derive(Default)]
struct Fields<'a>(Vec<SensitiveField<'a>>);

impl<'a> Fields<'a> {
    fn required(&mut self, path: impl Into<String>, value: &'a mut String) {
        self.0.push(SensitiveField {
            path: path.into(),
            slot: Slot::Required(value),
        });
    }

    fn optional(&mut self, path: impl Into<String>, value: &'a mut Option<String>) {
        self.0.push(SensitiveField {
            path: path.into(),
            slot: Slot::Optional(value),
        });
    }

    fn non_empty(&mut self, path: impl Into<String>, value: &'a mut String) {
        self.0.push(SensitiveField {
            path: path.into(),
            slot: Slot::NonEmpty(value),
        });
    }

    fn present(&mut self, path: impl Into<String>, value: &'a mut Option<String>) {
        self.0.push(SensitiveField {
            path: path.into(),
            slot: Slot::Present(value),
        });
    }

    fn custom_fields(&mut self, fields: &'a mut Option<Vec<CustomField>>) {
        for (i, field) in fields.iter_mut().flatten().enumerate() {
            let CustomField { name, value, .. } = field;
            self.required(format!("customFields[{i}].name"), name);
            self.required(format!("customFields[{i}].value"), value);
        }
    }
}

impl EnvelopeSchema for LoginItem {
    fn sensitive_fields(&mut self) -> Vec<SensitiveField<'_>> {
        let LoginItem {
            name,
            login_data,
            notes,
            icon_file,
            custom_fields,
            ..
        } = self;

        let mut out = Fields::default();
        out.optional("name", name);
        out.optional("loginData.username", &mut login_data.username);
        out.required("loginData.email", &mut login_data.email);
        out.required("loginData.password", &mut login_data.password);
        for (i, archived) in login_data.password_history.iter_mut().enumerate() {
            out.required(
                format!("loginData.passwordHistory[{i}].password"),
                &mut archived.password,
            );
        }
        if let Some(totp) = &mut login_data.totp {
            out.required("loginData.totp.secret", &mut totp.secret);
            for (i, code) in totp.backup_codes.iter_mut().enumerate() {
                out.required(format!("loginData.totp.backupCodes[{i}]"), code);
            }
        }
        for (i, url) in login_data.site_urls.iter_mut().flatten().enumerate() {
            out.required(format!("loginData.siteUrls[{i}]"), url);
        }
        out.present("notes", notes);
        out.optional("iconFile", icon_file);
        out.custom_fields(custom_fields);
        out.0
    }
}

impl EnvelopeSchema for PaymentCard {
    fn sensitive_fields(&mut self) -> Vec<SensitiveField<'_>> {
        let PaymentCard {
            name,
            color,
            pin,
            card_number,
            cardholder_name,
            expiry,
            security_code,
            notes,
            icon_file,
            custom_fields,
            ..
        } = self;

        let mut out = Fields::default();
        out.present("pin", pin);
        out.optional("name", name);
        out.optional("color", color);
        out.optional("iconFile", icon_file);
        out.non_empty("notes", notes);
        out.non_empty("expiry", expiry);
        out.non_empty("cardNumber", card_number);
        out.non_empty("securityCode", security_code);
        out.non_empty("cardholderName", cardholder_name);
        out.custom_fields(custom_fields);
        out.0
    }
}

impl EnvelopeSchema for SecureNote {
    fn sensitive_fields(&mut self) -> Vec<SensitiveField<'_>> {
        let mut out = Fields::default();
        out.required("notes", &mut self.notes);
        out.optional("color", &mut self.color);
        out.0
    }
}

impl EnvelopeSchema for Tag {
    fn sensitive_fields(&mut self) -> Vec<SensitiveField<'_>> {
        let mut out = Fields::default();
        out.required("name", &mut self.name);
        out.optional("color", &mut self.color);
        out.0
    }
}

impl EnvelopeSchema for VaultItem {
    fn sensitive_fields(&mut self) -> Vec<SensitiveField<'_>> {
        match self {
            VaultItem::Login(item) => item.sensitive_fields(),
            VaultItem::Note(item) => item.sensitive_fields(),
            VaultItem::PaymentCard(item) => item.sensitive_fields(),
            VaultItem::Tag(item) => item.sensitive_fields(),
        }
    }
}
