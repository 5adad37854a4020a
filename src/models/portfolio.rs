use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Resource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub name: String,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub avatar: String,
    pub resume: String,
    pub social: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonalInfoPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social: Option<BTreeMap<String, String>>,
}

impl Resource for PersonalInfo {
    const TABLE: &'static str = "personal_info";
    const LABEL: &'static str = "Personal info";
    type Create = Self;
    type Patch = PersonalInfoPatch;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub degree: String,
    pub school: String,
    pub period: String,
    pub description: String,
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EducationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degree: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
}

impl Resource for Education {
    const TABLE: &'static str = "education";
    const LABEL: &'static str = "Education";
    type Create = Self;
    type Patch = EducationPatch;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillItem {
    pub name: String,
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCategory {
    pub category: String,
    pub items: Vec<SkillItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillCategoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<SkillItem>>,
}

impl Resource for SkillCategory {
    const TABLE: &'static str = "skill_categories";
    const LABEL: &'static str = "Skill category";
    type Create = Self;
    type Patch = SkillCategoryPatch;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub title: String,
    pub description: String,
    pub technologies: Vec<String>,
    pub image: String,
    pub category: String,
    pub date: String,
    pub highlights: Vec<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub demo_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technologies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlights: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo_url: Option<String>,
}

impl Resource for Project {
    const TABLE: &'static str = "projects";
    const LABEL: &'static str = "Project";
    type Create = Self;
    type Patch = ProjectPatch;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub title: String,
    pub company: String,
    pub period: String,
    pub description: String,
    pub responsibilities: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperiencePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsibilities: Option<Vec<String>>,
}

impl Resource for Experience {
    const TABLE: &'static str = "experiences";
    const LABEL: &'static str = "Experience";
    type Create = Self;
    type Patch = ExperiencePatch;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certification {
    pub name: String,
    pub issuer: String,
    pub status: String,
    pub date: String,
    pub description: String,
    #[serde(default)]
    pub credential_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_url: Option<String>,
}

impl Resource for Certification {
    const TABLE: &'static str = "certifications";
    const LABEL: &'static str = "Certification";
    type Create = Self;
    type Patch = CertificationPatch;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Testimonial {
    pub name: String,
    pub role: String,
    pub company: String,
    pub content: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestimonialPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Resource for Testimonial {
    const TABLE: &'static str = "testimonials";
    const LABEL: &'static str = "Testimonial";
    type Create = Self;
    type Patch = TestimonialPatch;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
}

/// Visitors cannot submit a message that is already marked read
#[derive(Debug, Clone, Deserialize)]
pub struct ContactMessageCreate {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl From<ContactMessageCreate> for ContactMessage {
    fn from(create: ContactMessageCreate) -> Self {
        Self {
            name: create.name,
            email: create.email,
            message: create.message,
            read: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactMessagePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
}

impl Resource for ContactMessage {
    const TABLE: &'static str = "contact_messages";
    const LABEL: &'static str = "Contact message";
    type Create = ContactMessageCreate;
    type Patch = ContactMessagePatch;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub title: String,
    pub description: String,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcedurePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl Resource for Procedure {
    const TABLE: &'static str = "procedures";
    const LABEL: &'static str = "Procedure";
    type Create = Self;
    type Patch = ProcedurePatch;
}

/// Technology or legal watch digest ("veille")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VeilleContent {
    #[serde(rename = "type")]
    pub veille_type: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VeilleContentPatch {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub veille_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Resource for VeilleContent {
    const TABLE: &'static str = "veille_content";
    const LABEL: &'static str = "Veille content";
    type Create = Self;
    type Patch = VeilleContentPatch;
}
