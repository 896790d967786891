//! Directory content: curated talks, organizations, and community map pins.
//!
//! The sample sets below back the UI whenever the live API is unreachable
//! or returns nothing, so the directory pages are never empty.

use serde::{Deserialize, Serialize};

/// A curated talk in the content library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Talk {
    pub id: u32,
    pub title: String,
    pub speaker: String,
    /// Duration in seconds.
    pub duration: u32,
    pub description: String,
    pub url: String,
}

/// An organization listed in the action hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub mission: String,
    pub location: String,
    pub website: String,
    pub category: String,
}

/// A contributor pin on the community map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapPin {
    pub lat: f64,
    pub lng: f64,
    pub interest: String,
    pub category: String,
}

/// Bundled fallback talks.
pub fn sample_talks() -> Vec<Talk> {
    vec![
        Talk {
            id: 1,
            title: "The Power of Sustainable Living".into(),
            speaker: "Dr. Anika Patel".into(),
            duration: 1200,
            description: "Innovative approaches to eco-friendly urban development \
                          and community-driven sustainability initiatives."
                .into(),
            url: "https://ted.com/talks/sustainable-living".into(),
        },
        Talk {
            id: 2,
            title: "Tech for Social Good".into(),
            speaker: "Rahul Sharma".into(),
            duration: 900,
            description: "Leveraging emerging technologies to solve pressing community \
                          challenges and drive social impact."
                .into(),
            url: "https://ted.com/talks/tech-social-good".into(),
        },
        Talk {
            id: 3,
            title: "Women in STEM Leadership".into(),
            speaker: "Priya Deshmukh".into(),
            duration: 1500,
            description: "Breaking barriers and creating opportunities for women in \
                          science and technology fields."
                .into(),
            url: "https://ted.com/talks/women-stem".into(),
        },
    ]
}

/// Bundled fallback organizations.
pub fn sample_organizations() -> Vec<Organization> {
    vec![
        Organization {
            id: 1,
            name: "Green Earth Initiative".into(),
            kind: "NGO".into(),
            mission: "Promoting sustainable environmental practices through community \
                      engagement and education."
                .into(),
            location: "New Delhi, India".into(),
            website: "https://greenearth.org".into(),
            category: "environment".into(),
        },
        Organization {
            id: 2,
            name: "Education for All".into(),
            kind: "NGO".into(),
            mission: "Providing free education and resources to underprivileged children \
                      across rural India."
                .into(),
            location: "Mumbai, India".into(),
            website: "https://edu4all.org".into(),
            category: "education".into(),
        },
        Organization {
            id: 3,
            name: "Health Warriors".into(),
            kind: "NGO".into(),
            mission: "Improving healthcare access in remote areas through mobile clinics \
                      and awareness programs."
                .into(),
            location: "Chennai, India".into(),
            website: "https://healthwarriors.in".into(),
            category: "health".into(),
        },
    ]
}

/// Deterministic placeholder artwork for items without an image of their own.
pub fn placeholder_image(id: u32) -> String {
    const SEEDS: [&str; 5] = ["nature", "technology", "education", "health", "community"];
    let seed = SEEDS[id as usize % SEEDS.len()];
    format!("https://picsum.photos/seed/{seed}-{id}/400/300")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_are_nonempty() {
        assert!(!sample_talks().is_empty());
        assert!(!sample_organizations().is_empty());
    }

    #[test]
    fn test_organization_kind_serializes_as_type() {
        let json = serde_json::to_value(&sample_organizations()[0]).unwrap();
        assert_eq!(json["type"], "NGO");
    }

    #[test]
    fn test_placeholder_image_is_deterministic() {
        assert_eq!(placeholder_image(7), placeholder_image(7));
        assert!(placeholder_image(2).contains("education-2"));
    }
}
