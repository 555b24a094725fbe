//! Optimization scope
//!
//! One pipeline, parameterized by scope. The scope picks the system prompt,
//! the evidence collectors to run and the fields a proposal may touch.

use crate::models::field_alias::canonical_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Focus of one enrichment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationScope {
    /// Policy violations, invalid URLs/GTINs, price format
    CriticalErrors,
    /// Existence and validity of mandatory fields
    RequiredAttributes,
    /// Missing recommended attributes (color, material, ...)
    RecommendedAttributes,
    #[serde(alias = "title_optimization")]
    Title,
    #[serde(alias = "description_optimization")]
    Description,
    /// Image compliance (detection only)
    #[serde(alias = "image_analysis")]
    Image,
    #[serde(alias = "pricing_promotions")]
    Pricing,
    #[default]
    All,
}

/// Display metadata for a scope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeInfo {
    pub id: OptimizationScope,
    pub name: &'static str,
    pub description: &'static str,
    pub fields: &'static [&'static str],
    /// Changes are safe to roll out without A/B testing
    pub safe: bool,
}

impl OptimizationScope {
    pub const ALL: [OptimizationScope; 8] = [
        OptimizationScope::CriticalErrors,
        OptimizationScope::RequiredAttributes,
        OptimizationScope::RecommendedAttributes,
        OptimizationScope::Title,
        OptimizationScope::Description,
        OptimizationScope::Image,
        OptimizationScope::Pricing,
        OptimizationScope::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationScope::CriticalErrors => "critical_errors",
            OptimizationScope::RequiredAttributes => "required_attributes",
            OptimizationScope::RecommendedAttributes => "recommended_attributes",
            OptimizationScope::Title => "title",
            OptimizationScope::Description => "description",
            OptimizationScope::Image => "image",
            OptimizationScope::Pricing => "pricing",
            OptimizationScope::All => "all",
        }
    }

    pub fn info(&self) -> ScopeInfo {
        let (name, description, fields, safe): (_, _, &'static [&'static str], _) = match self {
            OptimizationScope::CriticalErrors => (
                "Critical Errors",
                "Fix policy violations, price/availability mismatch, invalid URLs/GTINs, image issues",
                &["link", "image_link", "price", "availability", "gtin"],
                true,
            ),
            OptimizationScope::RequiredAttributes => (
                "Required Attributes",
                "Complete mandatory fields: id, title, description, brand, gtin/mpn, condition",
                &["id", "title", "description", "brand", "gtin", "mpn", "condition"],
                true,
            ),
            OptimizationScope::RecommendedAttributes => (
                "Recommended Attributes",
                "Enrich with google_product_category, product_type, color, size, material, gender, age_group",
                &[
                    "google_product_category",
                    "product_type",
                    "color",
                    "size",
                    "material",
                    "pattern",
                    "gender",
                    "age_group",
                    "item_group_id",
                ],
                true,
            ),
            OptimizationScope::Title => (
                "Title Optimization",
                "Structure titles with category templates: Brand + Type + Color + Size + Material",
                &["title"],
                false,
            ),
            OptimizationScope::Description => (
                "Description Optimization",
                "Enhance descriptions: hook, features, specs, use cases",
                &["description", "product_highlight", "product_detail"],
                false,
            ),
            OptimizationScope::Image => (
                "Image Analysis",
                "Analyze image quality: resolution, background, framing, watermarks",
                &["image_link", "additional_image_link"],
                true,
            ),
            OptimizationScope::Pricing => (
                "Pricing & Promotions",
                "Validate pricing structure, sale prices, promotion dates",
                &["price", "sale_price", "sale_price_effective_date", "promotion_id"],
                true,
            ),
            OptimizationScope::All => ("All", "Every optimization in one pass", &[], true),
        };
        ScopeInfo {
            id: *self,
            name,
            description,
            fields,
            safe,
        }
    }

    /// Field list; empty for `All` (no restriction)
    pub fn fields(&self) -> &'static [&'static str] {
        self.info().fields
    }

    /// True if proposals for `field` are allowed in this scope
    pub fn covers_field(&self, field: &str) -> bool {
        if *self == OptimizationScope::All {
            return true;
        }
        let canonical = canonical_name(field);
        self.fields().contains(&canonical.as_str())
    }

    /// Visual evidence is gathered for this scope
    pub fn runs_visual(&self) -> bool {
        matches!(
            self,
            OptimizationScope::RecommendedAttributes
                | OptimizationScope::Title
                | OptimizationScope::Image
                | OptimizationScope::All
        )
    }

    /// Web evidence is gathered for this scope
    pub fn runs_web(&self) -> bool {
        matches!(
            self,
            OptimizationScope::RequiredAttributes
                | OptimizationScope::RecommendedAttributes
                | OptimizationScope::All
        )
    }
}

impl fmt::Display for OptimizationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "title_optimization" => return Ok(OptimizationScope::Title),
            "description_optimization" => return Ok(OptimizationScope::Description),
            "image_analysis" => return Ok(OptimizationScope::Image),
            "pricing_promotions" => return Ok(OptimizationScope::Pricing),
            _ => {}
        }
        OptimizationScope::ALL
            .into_iter()
            .find(|scope| scope.as_str() == normalized)
            .ok_or_else(|| format!("unknown optimization scope: {}", s))
    }
}
