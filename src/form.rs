//! Form state for one counseling session.
//!
//! `FormState` is a plain record. The only way the web layer mutates it is
//! [`FormState::set_field`], which replaces exactly one attribute.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::constants::DEFAULT_BIRTH_PLACE;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormError {
    #[error("unknown form field '{0}'")]
    UnknownField(String),
    #[error("invalid value '{value}' for field '{field}'")]
    InvalidValue { field: &'static str, value: String },
    #[error("field '{0}' requires the pair profile mode")]
    PartnerFieldInSingleMode(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Female,
    Male,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "female" => Ok(Gender::Female),
            "male" => Ok(Gender::Male),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Separated,
    AmbiguousContact,
    #[default]
    AnxiousDating,
    Unrequited,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 4] = [
        RelationshipType::Separated,
        RelationshipType::AmbiguousContact,
        RelationshipType::AnxiousDating,
        RelationshipType::Unrequited,
    ];

    /// Key used in form submissions and the JSON API.
    pub fn key(self) -> &'static str {
        match self {
            RelationshipType::Separated => "separated",
            RelationshipType::AmbiguousContact => "ambiguous_contact",
            RelationshipType::AnxiousDating => "anxious_dating",
            RelationshipType::Unrequited => "unrequited",
        }
    }

    /// Label shown to the user and written into the prompt.
    pub fn label(self) -> &'static str {
        match self {
            RelationshipType::Separated => "헤어졌어요",
            RelationshipType::AmbiguousContact => "연락은 하지만 무슨 사이인지 모르겠어요",
            RelationshipType::AnxiousDating => "연애중이지만 불안해요",
            RelationshipType::Unrequited => "짝사랑이예요",
        }
    }
}

// Accepts either the key or the Korean label.
impl FromStr for RelationshipType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == s || kind.label() == s)
            .ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonProfile {
    pub gender: Gender,
    /// Raw `datetime-local` value, kept exactly as entered.
    pub birth_date_time: String,
    pub birth_place: String,
}

impl Default for PersonProfile {
    fn default() -> Self {
        Self {
            gender: Gender::default(),
            birth_date_time: String::new(),
            birth_place: DEFAULT_BIRTH_PLACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileMode {
    Single,
    Pair,
}

impl FromStr for ProfileMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(ProfileMode::Single),
            "pair" => Ok(ProfileMode::Pair),
            _ => Err(()),
        }
    }
}

/// One profile (the person asking) or two (the person asking and their partner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Profiles {
    Single(PersonProfile),
    Pair {
        me: PersonProfile,
        partner: PersonProfile,
    },
}

impl Default for Profiles {
    fn default() -> Self {
        Profiles::Single(PersonProfile::default())
    }
}

impl Profiles {
    pub fn mode(&self) -> ProfileMode {
        match self {
            Profiles::Single(_) => ProfileMode::Single,
            Profiles::Pair { .. } => ProfileMode::Pair,
        }
    }

    pub fn me(&self) -> &PersonProfile {
        match self {
            Profiles::Single(me) | Profiles::Pair { me, .. } => me,
        }
    }

    pub fn partner(&self) -> Option<&PersonProfile> {
        match self {
            Profiles::Single(_) => None,
            Profiles::Pair { partner, .. } => Some(partner),
        }
    }

    fn me_mut(&mut self) -> &mut PersonProfile {
        match self {
            Profiles::Single(me) | Profiles::Pair { me, .. } => me,
        }
    }

    fn partner_mut(&mut self) -> Option<&mut PersonProfile> {
        match self {
            Profiles::Single(_) => None,
            Profiles::Pair { partner, .. } => Some(partner),
        }
    }

    // The asking person's profile survives a mode switch; a partner is
    // created fresh when entering pair mode and dropped when leaving it.
    fn switch_to(&mut self, mode: ProfileMode) {
        if self.mode() == mode {
            return;
        }
        let me = self.me().clone();
        *self = match mode {
            ProfileMode::Single => Profiles::Single(me),
            ProfileMode::Pair => Profiles::Pair {
                me,
                partner: PersonProfile::default(),
            },
        };
    }
}

/// Which profile a per-person field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Person {
    Me,
    Partner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    ReadingTitle,
    Situation,
    SystemPromptTemplate,
    RelationshipType,
    ProfileMode,
    Gender(Person),
    BirthDateTime(Person),
    BirthPlace(Person),
}

impl FormField {
    /// Canonical name, matching the `name` attribute in the page.
    pub fn name(self) -> &'static str {
        match self {
            FormField::ReadingTitle => "readingTitle",
            FormField::Situation => "situation",
            FormField::SystemPromptTemplate => "systemPromptTemplate",
            FormField::RelationshipType => "relationshipType",
            FormField::ProfileMode => "profileMode",
            FormField::Gender(Person::Me) => "myGender",
            FormField::Gender(Person::Partner) => "partnerGender",
            FormField::BirthDateTime(Person::Me) => "myBirthDate",
            FormField::BirthDateTime(Person::Partner) => "partnerBirthDate",
            FormField::BirthPlace(Person::Me) => "myBirthPlace",
            FormField::BirthPlace(Person::Partner) => "partnerBirthPlace",
        }
    }
}

impl FromStr for FormField {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s {
            "readingTitle" => FormField::ReadingTitle,
            "situation" => FormField::Situation,
            "systemPromptTemplate" | "systemPrompt" => FormField::SystemPromptTemplate,
            "relationshipType" => FormField::RelationshipType,
            "profileMode" => FormField::ProfileMode,
            "myGender" | "gender" => FormField::Gender(Person::Me),
            "myBirthDate" | "birthDate" => FormField::BirthDateTime(Person::Me),
            "myBirthPlace" | "birthPlace" => FormField::BirthPlace(Person::Me),
            "partnerGender" => FormField::Gender(Person::Partner),
            "partnerBirthDate" => FormField::BirthDateTime(Person::Partner),
            "partnerBirthPlace" => FormField::BirthPlace(Person::Partner),
            other => return Err(FormError::UnknownField(other.to_string())),
        };
        Ok(field)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormState {
    pub reading_title: String,
    pub situation: String,
    pub system_prompt_template: String,
    pub relationship_type: RelationshipType,
    pub profiles: Profiles,
}

impl FormState {
    /// Replaces the attribute named `name` with `value`.
    ///
    /// Every other attribute is left as it was. On error nothing changes.
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        let field = name.parse::<FormField>()?;
        self.apply(field, value)
    }

    /// Applies a batch of posted fields, all or nothing.
    ///
    /// `profileMode` is applied first so partner fields land in the right
    /// shape. Partner fields left over from pair mode are dropped when the
    /// batch switches to single mode.
    pub fn set_fields<'a>(
        &mut self,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<(), FormError> {
        let mut parsed = fields
            .into_iter()
            .map(|(name, value)| Ok((name.parse::<FormField>()?, value)))
            .collect::<Result<Vec<_>, FormError>>()?;
        // Stable sort: mode first, everything else keeps its posted order
        parsed.sort_by_key(|(field, _)| *field != FormField::ProfileMode);

        let mut updated = self.clone();
        for (field, value) in parsed {
            match updated.apply(field, value) {
                Ok(()) | Err(FormError::PartnerFieldInSingleMode(_)) => {}
                Err(e) => return Err(e),
            }
        }
        *self = updated;
        Ok(())
    }

    pub fn apply(&mut self, field: FormField, value: &str) -> Result<(), FormError> {
        let invalid = || FormError::InvalidValue {
            field: field.name(),
            value: value.to_string(),
        };

        match field {
            FormField::ReadingTitle => self.reading_title = value.to_string(),
            FormField::Situation => self.situation = value.to_string(),
            FormField::SystemPromptTemplate => self.system_prompt_template = value.to_string(),
            FormField::RelationshipType => {
                self.relationship_type = value.parse::<RelationshipType>().map_err(|_| invalid())?;
            }
            FormField::ProfileMode => {
                let mode = value.parse::<ProfileMode>().map_err(|_| invalid())?;
                self.profiles.switch_to(mode);
            }
            FormField::Gender(person) => {
                let gender = value.parse::<Gender>().map_err(|_| invalid())?;
                self.profile_mut(field, person)?.gender = gender;
            }
            FormField::BirthDateTime(person) => {
                self.profile_mut(field, person)?.birth_date_time = value.to_string();
            }
            FormField::BirthPlace(person) => {
                self.profile_mut(field, person)?.birth_place = value.to_string();
            }
        }
        Ok(())
    }

    fn profile_mut(
        &mut self,
        field: FormField,
        person: Person,
    ) -> Result<&mut PersonProfile, FormError> {
        match person {
            Person::Me => Ok(self.profiles.me_mut()),
            Person::Partner => self
                .profiles
                .partner_mut()
                .ok_or(FormError::PartnerFieldInSingleMode(field.name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_pair() -> FormState {
        let mut form = FormState::default();
        form.set_field("profileMode", "pair").unwrap();
        form.set_field("readingTitle", "올해의 인연").unwrap();
        form.set_field("situation", "We fought").unwrap();
        form.set_field("systemPromptTemplate", "Be kind").unwrap();
        form.set_field("myBirthDate", "1995-03-02T08:30").unwrap();
        form.set_field("partnerGender", "male").unwrap();
        form.set_field("partnerBirthDate", "1994-11-20T23:10").unwrap();
        form.set_field("partnerBirthPlace", "Busan").unwrap();
        form
    }

    #[test]
    fn test_default_form() {
        let form = FormState::default();
        assert_eq!(form.reading_title, "");
        assert_eq!(form.situation, "");
        assert_eq!(form.system_prompt_template, "");
        assert_eq!(form.relationship_type, RelationshipType::AnxiousDating);
        assert_eq!(form.profiles.mode(), ProfileMode::Single);
        assert_eq!(form.profiles.me().gender, Gender::Female);
        assert_eq!(form.profiles.me().birth_place, DEFAULT_BIRTH_PLACE);
        assert!(form.profiles.partner().is_none());
    }

    #[test]
    fn test_set_field_changes_only_named_attribute() {
        let cases = [
            ("readingTitle", "new title"),
            ("situation", "new situation"),
            ("systemPromptTemplate", "new template"),
            ("relationshipType", "unrequited"),
            ("myGender", "female"),
            ("myBirthDate", "2000-01-01T00:00"),
            ("myBirthPlace", "Jeju"),
            ("partnerGender", "female"),
            ("partnerBirthDate", "2001-02-03T04:05"),
            ("partnerBirthPlace", "Incheon"),
        ];

        for (name, value) in cases {
            let before = filled_pair();
            let mut after = before.clone();
            after.set_field(name, value).unwrap();

            // Undo the one expected change, the rest must match exactly.
            let mut restored = after.clone();
            let field: FormField = name.parse().unwrap();
            let previous = match field {
                FormField::ReadingTitle => before.reading_title.clone(),
                FormField::Situation => before.situation.clone(),
                FormField::SystemPromptTemplate => before.system_prompt_template.clone(),
                FormField::RelationshipType => before.relationship_type.key().to_string(),
                FormField::Gender(Person::Me) => before.profiles.me().gender.to_string(),
                FormField::BirthDateTime(Person::Me) => before.profiles.me().birth_date_time.clone(),
                FormField::BirthPlace(Person::Me) => before.profiles.me().birth_place.clone(),
                FormField::Gender(Person::Partner) => {
                    before.profiles.partner().unwrap().gender.to_string()
                }
                FormField::BirthDateTime(Person::Partner) => {
                    before.profiles.partner().unwrap().birth_date_time.clone()
                }
                FormField::BirthPlace(Person::Partner) => {
                    before.profiles.partner().unwrap().birth_place.clone()
                }
                FormField::ProfileMode => unreachable!(),
            };
            restored.apply(field, &previous).unwrap();
            assert_eq!(restored, before, "set_field({name}) touched another attribute");
        }
    }

    #[test]
    fn test_set_field_stores_values_verbatim() {
        let mut form = FormState::default();
        form.set_field("situation", "  line one\nline two  ").unwrap();
        form.set_field("myBirthDate", "2025-01-01T10:00").unwrap();
        assert_eq!(form.situation, "  line one\nline two  ");
        assert_eq!(form.profiles.me().birth_date_time, "2025-01-01T10:00");
    }

    #[test]
    fn test_field_aliases() {
        let mut form = FormState::default();
        form.set_field("systemPrompt", "alias").unwrap();
        form.set_field("birthDate", "1990-05-05T05:05").unwrap();
        form.set_field("birthPlace", "Daegu").unwrap();
        form.set_field("gender", "male").unwrap();
        assert_eq!(form.system_prompt_template, "alias");
        assert_eq!(form.profiles.me().birth_date_time, "1990-05-05T05:05");
        assert_eq!(form.profiles.me().birth_place, "Daegu");
        assert_eq!(form.profiles.me().gender, Gender::Male);
    }

    #[test]
    fn test_relationship_type_accepts_key_and_label() {
        let mut form = FormState::default();
        form.set_field("relationshipType", "separated").unwrap();
        assert_eq!(form.relationship_type, RelationshipType::Separated);
        form.set_field("relationshipType", "짝사랑이예요").unwrap();
        assert_eq!(form.relationship_type, RelationshipType::Unrequited);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut form = FormState::default();
        let err = form.set_field("favoriteColor", "blue").unwrap_err();
        assert_eq!(err, FormError::UnknownField("favoriteColor".to_string()));
        assert_eq!(form, FormState::default());
    }

    #[test]
    fn test_invalid_enum_value_leaves_form_untouched() {
        let mut form = FormState::default();
        let err = form.set_field("myGender", "other").unwrap_err();
        assert!(matches!(err, FormError::InvalidValue { field: "myGender", .. }));
        let err = form.set_field("relationshipType", "married").unwrap_err();
        assert!(matches!(err, FormError::InvalidValue { field: "relationshipType", .. }));
        assert_eq!(form, FormState::default());
    }

    #[test]
    fn test_partner_field_requires_pair_mode() {
        let mut form = FormState::default();
        let err = form.set_field("partnerBirthPlace", "Busan").unwrap_err();
        assert_eq!(err, FormError::PartnerFieldInSingleMode("partnerBirthPlace"));
        assert_eq!(form, FormState::default());
    }

    #[test]
    fn test_profile_mode_switch_keeps_my_profile() {
        let mut form = filled_pair();
        let me = form.profiles.me().clone();

        form.set_field("profileMode", "single").unwrap();
        assert_eq!(form.profiles, Profiles::Single(me.clone()));

        form.set_field("profileMode", "pair").unwrap();
        assert_eq!(form.profiles.me(), &me);
        assert_eq!(form.profiles.partner(), Some(&PersonProfile::default()));
    }

    #[test]
    fn test_profile_mode_same_mode_is_noop() {
        let mut form = filled_pair();
        let before = form.clone();
        form.set_field("profileMode", "pair").unwrap();
        assert_eq!(form, before);
    }

    #[test]
    fn test_set_fields_switches_mode_before_partner_fields() {
        let mut form = FormState::default();
        form.set_fields([
            ("partnerBirthPlace", "Busan"),
            ("profileMode", "pair"),
            ("situation", "s"),
        ])
        .unwrap();
        assert_eq!(form.profiles.partner().unwrap().birth_place, "Busan");
        assert_eq!(form.situation, "s");
    }

    #[test]
    fn test_set_fields_drops_partner_fields_in_single_mode() {
        let mut form = filled_pair();
        form.set_fields([("profileMode", "single"), ("partnerGender", "female")])
            .unwrap();
        assert!(form.profiles.partner().is_none());
    }

    #[test]
    fn test_set_fields_is_all_or_nothing() {
        let mut form = FormState::default();
        assert!(form.set_fields([("situation", "s"), ("myGender", "unknown")]).is_err());
        assert!(form.set_fields([("situation", "s"), ("nope", "x")]).is_err());
        assert_eq!(form, FormState::default());
    }
}
