//! Input rules shared by every write and query handler.
//!
//! Everything here is pure: no store access, no logging. Handlers run these
//! checks before they touch a transaction.

use chrono::NaiveDate;
use serde_json::Value;
use validator::{Validate, ValidationErrors};

use crate::entities::category::Category;
use crate::error::{ApiError, ApiResult};

pub const BRANDS: [&str; 4] = ["ACER", "ASUS", "LENOVO", "NINGMEI"];
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const MIN_SEARCH_LEN: usize = 2;

/// Which of {brand, subcategory} a category carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Facet {
    Brand,
    Subcategory,
    Neither,
}

#[derive(Debug)]
pub struct CategoryRule {
    pub category: Category,
    pub facet: Facet,
    pub subcategories: &'static [&'static str],
}

static RULES: [CategoryRule; 5] = [
    CategoryRule {
        category: Category::Laptops,
        facet: Facet::Brand,
        subcategories: &[],
    },
    CategoryRule {
        category: Category::DesktopPcs,
        facet: Facet::Subcategory,
        subcategories: &["PC Bundles", "PC Monitors", "System Units"],
    },
    CategoryRule {
        category: Category::Components,
        facet: Facet::Subcategory,
        subcategories: &["Cooling Systems", "PC Cases"],
    },
    CategoryRule {
        category: Category::Accessories,
        facet: Facet::Subcategory,
        subcategories: &["Headset", "Keyboard", "Mouse"],
    },
    CategoryRule {
        category: Category::Speakers,
        facet: Facet::Neither,
        subcategories: &[],
    },
];

pub fn rule_for(category: Category) -> &'static CategoryRule {
    match category {
        Category::Laptops => &RULES[0],
        Category::DesktopPcs => &RULES[1],
        Category::Components => &RULES[2],
        Category::Accessories => &RULES[3],
        Category::Speakers => &RULES[4],
    }
}

/// Brand/subcategory pair after the category rule table has been applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub brand: Option<String>,
    pub subcategory: Option<String>,
}

/// Filter request that passed the rule table; unset fields are not filtered on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub category: Option<Category>,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
}

// Lenient integer parsing for paging parameters; never fails.
pub fn validate_positive_int(value: Option<&str>, default: u64) -> u64 {
    value
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .map(|v| v as u64)
        .unwrap_or(default)
}

pub fn validate_positive_number(value: &Value, field_name: &str) -> ApiResult<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
    .ok_or_else(|| ApiError::Validation(format!("{field_name} must be a valid number")))?;

    if number <= 0.0 {
        return Err(ApiError::Validation(format!(
            "{field_name} must be a positive number"
        )));
    }
    Ok(number)
}

pub fn validate_date(date_string: &str) -> ApiResult<NaiveDate> {
    let trimmed = date_string.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Date is required"));
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|_| ApiError::validation("Invalid date format. Use YYYY-MM-DD"))
}

/// `true`/`false` query flags, case-insensitive. Anything else is `false`.
pub fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value {
        Some(raw) => raw.trim().eq_ignore_ascii_case("true"),
        None => default,
    }
}

pub fn parse_category(value: &str) -> ApiResult<Category> {
    value.parse::<Category>().map_err(|_| {
        let names: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
        ApiError::Validation(format!(
            "Invalid category. Must be one of: {}",
            names.join(", ")
        ))
    })
}

/// Case-insensitive brand match, returned in its stored (uppercase) form.
pub fn normalize_brand(value: &str) -> ApiResult<String> {
    let upper = value.trim().to_uppercase();
    if BRANDS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(ApiError::Validation(format!(
            "Invalid brand. Must be one of: {}",
            BRANDS.join(", ")
        )))
    }
}

pub fn check_subcategory(category: Category, value: &str) -> ApiResult<String> {
    let rule = rule_for(category);
    if rule.facet != Facet::Subcategory {
        return Err(ApiError::Validation(format!(
            "{category} does not have subcategories"
        )));
    }
    if rule.subcategories.contains(&value) {
        Ok(value.to_owned())
    } else {
        Err(ApiError::Validation(format!(
            "Invalid subcategory for {category}. Must be one of: {}",
            rule.subcategories.join(", ")
        )))
    }
}

/// Applies the category rule table: the facet the category uses is validated
/// and required, the other one is forced to `None`.
pub fn apply_category_rules(
    category: Category,
    brand: Option<&str>,
    subcategory: Option<&str>,
) -> ApiResult<Classification> {
    let brand = brand.map(str::trim).filter(|b| !b.is_empty());
    let subcategory = subcategory.map(str::trim).filter(|s| !s.is_empty());

    let (brand, subcategory) = match rule_for(category).facet {
        Facet::Brand => {
            let brand = brand.ok_or_else(|| {
                ApiError::Validation(format!("{category} must have a brand"))
            })?;
            (Some(normalize_brand(brand)?), None)
        }
        Facet::Subcategory => {
            let subcategory = subcategory.ok_or_else(|| {
                ApiError::Validation(format!("{category} must have a subcategory"))
            })?;
            (None, Some(check_subcategory(category, subcategory)?))
        }
        Facet::Neither => (None, None),
    };

    Ok(Classification {
        category,
        brand,
        subcategory,
    })
}

/// Checks that a category/subcategory/brand filter combination is legal.
pub fn check_filter(
    category: Option<&str>,
    subcategory: Option<&str>,
    brand: Option<&str>,
) -> ApiResult<CatalogFilter> {
    let category = category.map(str::trim).filter(|c| !c.is_empty());
    let subcategory = subcategory.map(str::trim).filter(|s| !s.is_empty());
    let brand = brand.map(str::trim).filter(|b| !b.is_empty());

    let Some(category) = category else {
        let subcategory = match subcategory {
            Some(sub) => {
                let owner = RULES
                    .iter()
                    .find(|rule| rule.subcategories.contains(&sub))
                    .ok_or_else(|| ApiError::Validation(format!("Invalid subcategory: {sub}")))?;
                Some(check_subcategory(owner.category, sub)?)
            }
            None => None,
        };
        return Ok(CatalogFilter {
            category: None,
            subcategory,
            brand: brand.map(normalize_brand).transpose()?,
        });
    };

    let category = parse_category(category)?;
    let mut filter = CatalogFilter {
        category: Some(category),
        ..Default::default()
    };

    match rule_for(category).facet {
        Facet::Brand => {
            if subcategory.is_some() {
                return Err(ApiError::Validation(format!(
                    "{category} cannot be filtered by subcategory"
                )));
            }
            filter.brand = brand.map(normalize_brand).transpose()?;
        }
        Facet::Subcategory => {
            if brand.is_some() {
                return Err(ApiError::Validation(format!(
                    "{category} cannot be filtered by brand"
                )));
            }
            filter.subcategory = subcategory
                .map(|sub| check_subcategory(category, sub))
                .transpose()?;
        }
        Facet::Neither => {
            if subcategory.is_some() || brand.is_some() {
                return Err(ApiError::Validation(format!(
                    "{category} cannot be filtered by brand or subcategory"
                )));
            }
        }
    }

    Ok(filter)
}

pub fn search_term(q: Option<&str>) -> ApiResult<String> {
    let term = q.map(str::trim).unwrap_or_default();
    if term.is_empty() {
        return Err(ApiError::validation(
            "Search term is required (use ?q=search_term)",
        ));
    }
    if term.chars().count() < MIN_SEARCH_LEN {
        return Err(ApiError::Validation(format!(
            "Search term must be at least {MIN_SEARCH_LEN} characters"
        )));
    }
    Ok(term.to_owned())
}

/// Trimmed, non-empty value of a required text field.
pub fn required_text(value: Option<&str>, field: &str) -> ApiResult<String> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_owned()),
        _ => Err(ApiError::Validation(format!("Missing required field: {field}"))),
    }
}

/// Trimmed value of an optional text field that may not be blank when supplied.
pub fn non_empty_text(value: Option<&str>, field: &str) -> ApiResult<Option<String>> {
    match value.map(str::trim) {
        Some("") => Err(ApiError::Validation(format!("{field} cannot be empty"))),
        other => Ok(other.map(str::to_owned)),
    }
}

/// Runs `validator` derive rules and folds the messages into one error.
pub fn check<T: Validate>(value: &T) -> ApiResult<()> {
    value.validate().map_err(|errors| validation_message(&errors))
}

fn validation_message(errors: &ValidationErrors) -> ApiError {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |err| match &err.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid ({})", err.code),
            })
        })
        .collect();
    messages.sort();
    ApiError::Validation(messages.join("; "))
}
