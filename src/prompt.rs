use crate::form::{FormState, PersonProfile, Profiles};

const TITLE_HEADER: &str = "[리딩 주제]";
const PROFILE_HEADER: &str = "[생년월일 정보]";
const MY_PROFILE_HEADER: &str = "[생년월일 정보 - 나]";
const PARTNER_PROFILE_HEADER: &str = "[생년월일 정보 - 상대방]";
const RELATIONSHIP_HEADER: &str = "[관계의 유형]";
const SITUATION_HEADER: &str = "[상황 설명]";

/// True when both required free-text fields have non-whitespace content.
pub fn is_dispatchable(form: &FormState) -> bool {
    !form.situation.trim().is_empty() && !form.system_prompt_template.trim().is_empty()
}

/// Builds the full prompt: the raw system template, a newline, then the
/// labeled user-data sections in fixed order.
pub fn build_prompt(form: &FormState) -> String {
    let profiles = match &form.profiles {
        Profiles::Single(me) => profile_section(PROFILE_HEADER, me),
        Profiles::Pair { me, partner } => format!(
            "{}\n{}",
            profile_section(MY_PROFILE_HEADER, me),
            profile_section(PARTNER_PROFILE_HEADER, partner)
        ),
    };

    format!(
        "{}\n{TITLE_HEADER}\n{}\n{profiles}\n{RELATIONSHIP_HEADER}\n{}\n{SITUATION_HEADER}\n{}",
        form.system_prompt_template,
        form.reading_title,
        form.relationship_type.label(),
        form.situation,
    )
}

fn profile_section(header: &str, profile: &PersonProfile) -> String {
    format!(
        "{header}\n- 성별: {}\n- 생년월일: {}\n- 출생지: {}",
        profile.gender, profile.birth_date_time, profile.birth_place
    )
}
