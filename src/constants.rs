/// Defaults shared by the loader, the validation engine and the config layer.
///
/// Everything here is the out-of-the-box behaviour; deployments override the
/// tables through `EtlConfig` rather than editing these slices.

// Derived columns appended to the 17 standard fields
pub const GENDER_NORM: &str = "gender_norm";
pub const ETHNICITY_NORM: &str = "ethnicity_norm";
pub const AGE_GROUP: &str = "age_group";
pub const LOG_TOTAL_SPENT: &str = "log_total_spent";
pub const REVIEW_LENGTH: &str = "review_length";
pub const REVIEW_TEXT_TRUNC: &str = "review_text_trunc";

// Restaurant metadata columns
pub const ADDRESS: &str = "address";
pub const AVG_STARS: &str = "avg_stars";
pub const TOTAL_REVIEWS: &str = "total_reviews";

/// Tip percentages above this are clamped to it
pub const TIP_PERCENTAGE_CAP: f64 = 30.0;

/// Characters kept in `review_text_trunc`
pub const MAX_REVIEW_LENGTH: usize = 2000;

pub const REVIEW_TEXT_MISSING_WARN: f64 = 0.40;
pub const REVIEW_TEXT_MISSING_FAIL: f64 = 0.50;
pub const AGE_RANGE_MISSING_WARN: f64 = 0.20;

/// Cell contents read as missing values
pub const NA_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "null", "NULL", "None", "#N/A", "<NA>",
];

/// Recognized raw header aliases per unified field, in priority order.
/// `rating_scale`, `rating_1_5` and `source_file` are always derived.
pub const DEFAULT_SYNONYMS: &[(&str, &[&str])] = &[
    ("review_id", &["review_id", "review_number", "id"]),
    ("customer_name", &["customer_name", "guest_name", "name"]),
    ("review_date", &["date", "visit_date", "review_date"]),
    (
        "rating_raw",
        &["rating", "satisfaction_score", "rating_out_of_10", "star_rating"],
    ),
    ("review_text", &["review_text", "feedback_comments", "comments"]),
    ("location", &["location", "venue_location", "venue"]),
    (
        "restaurant_name",
        &["restaurant_name", "business_name", "establishment"],
    ),
    ("total_spent", &["total_spent"]),
    ("tip_amount", &["tip_amount"]),
    ("tip_percentage", &["tip_percentage"]),
    ("party_size", &["party_size"]),
    ("age_range", &["age_range"]),
    ("gender", &["gender"]),
    ("ethnicity", &["ethnicity"]),
];

pub const DEFAULT_GENDER_MAP: &[(&str, &str)] = &[
    ("m", "male"),
    ("male", "male"),
    ("f", "female"),
    ("female", "female"),
    ("o", "other"),
    ("other", "other"),
    ("non-binary", "non_binary"),
    ("prefer not to say", "na"),
];

pub const DEFAULT_ETHNICITY_MAP: &[(&str, &str)] = &[
    ("caucasian", "caucasian"),
    ("white", "caucasian"),
    ("black", "african_american"),
    ("african american", "african_american"),
    ("asian", "asian"),
    ("latino", "hispanic"),
    ("hispanic", "hispanic"),
    ("mixed", "mixed"),
    ("native american", "native_american"),
    ("other", "other"),
];

pub const DEFAULT_AGE_RANGE_MAP: &[(&str, &str)] = &[
    ("18-25", "young_adult"),
    ("26-35", "adult"),
    ("36-45", "mid_age"),
    ("46-55", "mature"),
    ("56-65", "senior"),
    ("65+", "elder"),
];
