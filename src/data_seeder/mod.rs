use sqlx::sqlite::SqliteConnection;
use std::collections::BTreeMap;
use tracing::info;

use crate::{
    database,
    error::AppResult,
    models::{
        Certification, Education, Experience, PersonalInfo, Procedure, Project, SkillCategory,
        SkillItem, Testimonial, VeilleContent,
    },
};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Insert demo content when no personal info exists yet; returns whether anything was written
pub async fn seed_demo_data(conn: &mut SqliteConnection) -> AppResult<bool> {
    if database::count::<PersonalInfo>(conn).await? > 0 {
        return Ok(false);
    }

    info!("🌱 Seeding demo portfolio content...");

    database::insert(
        conn,
        PersonalInfo {
            name: "Alex Martin".to_string(),
            title: "Network & Systems Administrator".to_string(),
            subtitle: "Infrastructure, security and automation".to_string(),
            description: "Administrator focused on reliable infrastructure and clean tooling."
                .to_string(),
            email: "alex.martin@example.com".to_string(),
            phone: "+33 6 00 00 00 00".to_string(),
            location: "Paris, France".to_string(),
            avatar: "/images/avatar.png".to_string(),
            resume: "/files/resume.pdf".to_string(),
            social: BTreeMap::from([
                ("github".to_string(), "https://github.com/example".to_string()),
                ("linkedin".to_string(), "https://linkedin.com/in/example".to_string()),
            ]),
        },
    )
    .await?;

    database::insert(
        conn,
        Education {
            degree: "BTS SIO - SISR".to_string(),
            school: "Lycée Technique".to_string(),
            period: "2022 - 2024".to_string(),
            description: "Infrastructure, systems and networks option.".to_string(),
            skills: strings(&["Linux", "Windows Server", "Cisco", "Virtualization"]),
        },
    )
    .await?;

    database::insert(
        conn,
        SkillCategory {
            category: "Systems".to_string(),
            items: vec![
                SkillItem {
                    name: "Linux".to_string(),
                    level: 85,
                },
                SkillItem {
                    name: "Active Directory".to_string(),
                    level: 75,
                },
            ],
        },
    )
    .await?;

    database::insert(
        conn,
        Project {
            title: "Network monitoring lab".to_string(),
            description: "Monitoring stack for a small business network.".to_string(),
            technologies: strings(&["Zabbix", "Grafana", "SNMP"]),
            image: "/images/projects/monitoring.png".to_string(),
            category: "Infrastructure".to_string(),
            date: "2024".to_string(),
            highlights: strings(&["Alerting on link loss", "Dashboards per site"]),
            github_url: None,
            demo_url: None,
        },
    )
    .await?;

    database::insert(
        conn,
        Experience {
            title: "Systems Administrator (intern)".to_string(),
            company: "Example Corp".to_string(),
            period: "2023".to_string(),
            description: "Maintained the internal server fleet.".to_string(),
            responsibilities: strings(&["Patch management", "Backup verification"]),
        },
    )
    .await?;

    database::insert(
        conn,
        Certification {
            name: "CCNA".to_string(),
            issuer: "Cisco".to_string(),
            status: "In progress".to_string(),
            date: "2025".to_string(),
            description: "Routing and switching fundamentals.".to_string(),
            credential_url: None,
        },
    )
    .await?;

    database::insert(
        conn,
        Testimonial {
            name: "Jordan Lee".to_string(),
            role: "IT Manager".to_string(),
            company: "Example Corp".to_string(),
            content: "Reliable, curious and thorough.".to_string(),
            avatar: "/images/testimonials/jordan.png".to_string(),
        },
    )
    .await?;

    database::insert(
        conn,
        Procedure {
            title: "Restore a VM from backup".to_string(),
            description: "Step-by-step restore procedure.".to_string(),
            content: "1. Locate the snapshot\n2. Restore to an isolated network\n3. Verify services"
                .to_string(),
            category: "Backup".to_string(),
            tags: strings(&["backup", "virtualization"]),
        },
    )
    .await?;

    for (veille_type, title) in [
        ("technologique", "Zero trust networking"),
        ("juridique", "GDPR and log retention"),
    ] {
        database::insert(
            conn,
            VeilleContent {
                veille_type: veille_type.to_string(),
                title: title.to_string(),
                content: "Summary of recent developments.".to_string(),
            },
        )
        .await?;
    }

    info!("✅ Demo content seeded");
    Ok(true)
}
