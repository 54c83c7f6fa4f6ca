//! arXiv archive codes accepted as a search category.

use crate::error::InvalidCategoryError;

/// Archive code → display name.
pub const ARXIV_CATEGORIES: &[(&str, &str)] = &[
    ("cs",       "Computer Science"),
    ("math",     "Mathematics"),
    ("physics",  "Physics"),
    ("astro-ph", "Astrophysics"),
    ("cond-mat", "Condensed Matter"),
    ("gr-qc",    "General Relativity and Quantum Cosmology"),
    ("hep-ex",   "High Energy Physics - Experiment"),
    ("hep-lat",  "High Energy Physics - Lattice"),
    ("hep-ph",   "High Energy Physics - Phenomenology"),
    ("hep-th",   "High Energy Physics - Theory"),
    ("math-ph",  "Mathematical Physics"),
    ("nlin",     "Nonlinear Sciences"),
    ("nucl-ex",  "Nuclear Experiment"),
    ("nucl-th",  "Nuclear Theory"),
    ("quant-ph", "Quantum Physics"),
    ("q-bio",    "Quantitative Biology"),
    ("q-fin",    "Quantitative Finance"),
    ("stat",     "Statistics"),
    ("eess",     "Electrical Engineering and Systems Science"),
    ("econ",     "Economics"),
];

pub fn is_valid_arxiv_category(code: &str) -> bool {
    ARXIV_CATEGORIES.iter().any(|(c, _)| *c == code)
}

pub fn category_codes() -> Vec<&'static str> {
    ARXIV_CATEGORIES.iter().map(|(c, _)| *c).collect()
}

/// Check a client-supplied category, returning the error that lists the
/// valid codes when it is not one of them.
pub fn validate_arxiv_category(code: &str) -> Result<&str, InvalidCategoryError> {
    let trimmed = code.trim();
    if is_valid_arxiv_category(trimmed) {
        Ok(trimmed)
    } else {
        Err(InvalidCategoryError::new(code))
    }
}
