use crate::error::{ReviewError, Result};
use crate::models::{NewReview, Rating, ReviewDraft};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_BODY_CHARS: usize = 5000;
pub const MAX_IMAGES: usize = 10;

/// Check a review request and normalize its text fields
pub fn validate_new_review(input: NewReview) -> Result<ReviewDraft> {
    let rating = Rating::new(input.rating)?;

    let product_id = required("product_id", &input.product_id)?;
    let user_id = required("user_id", &input.user_id)?;
    let user_name = required("user_name", &input.user_name)?;
    let title = required("title", &input.title)?;
    let review_body = required("review body", &input.review_body)?;

    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ReviewError::Validation(format!(
            "title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    if review_body.chars().count() > MAX_BODY_CHARS {
        return Err(ReviewError::Validation(format!(
            "review body must be at most {} characters",
            MAX_BODY_CHARS
        )));
    }

    if input.images.len() > MAX_IMAGES {
        return Err(ReviewError::Validation(format!(
            "at most {} images may be attached",
            MAX_IMAGES
        )));
    }
    let mut images = Vec::with_capacity(input.images.len());
    for url in &input.images {
        let url = url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ReviewError::Validation(format!(
                "image must be an http(s) URL: {}",
                url
            )));
        }
        images.push(url.to_string());
    }

    let order_id = input
        .order_id
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty());

    Ok(ReviewDraft {
        product_id,
        user_id,
        user_name,
        rating,
        title,
        review_body,
        images,
        order_id,
        is_verified_purchase: input.is_verified_purchase,
    })
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ReviewError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> NewReview {
        NewReview {
            product_id: "gid://shop/Product/1".to_string(),
            user_id: "customer-1".to_string(),
            user_name: "Ada".to_string(),
            rating: 5,
            title: "  Great kettle ".to_string(),
            review_body: "Boils fast.".to_string(),
            images: vec!["https://cdn.example.com/a.jpg".to_string()],
            order_id: Some(" order-1 ".to_string()),
            is_verified_purchase: true,
        }
    }

    #[test]
    fn test_valid_input_is_normalized() {
        let draft = validate_new_review(input()).unwrap();
        assert_eq!(draft.title, "Great kettle");
        assert_eq!(draft.order_id.as_deref(), Some("order-1"));
        assert_eq!(draft.rating.value(), 5);
    }

    #[test]
    fn test_rating_out_of_range() {
        let mut bad = input();
        bad.rating = 6;
        assert!(matches!(
            validate_new_review(bad),
            Err(ReviewError::Validation(_))
        ));
    }

    #[test]
    fn test_blank_text_rejected() {
        let mut bad = input();
        bad.title = "   ".to_string();
        assert!(validate_new_review(bad).is_err());

        let mut bad = input();
        bad.review_body = String::new();
        assert!(validate_new_review(bad).is_err());
    }

    #[test]
    fn test_image_limits() {
        let mut bad = input();
        bad.images = vec!["ftp://host/a.png".to_string()];
        assert!(validate_new_review(bad).is_err());

        let mut bad = input();
        bad.images = (0..=MAX_IMAGES)
            .map(|i| format!("https://cdn.example.com/{}.jpg", i))
            .collect();
        assert!(validate_new_review(bad).is_err());
    }

    #[test]
    fn test_title_length_counts_chars() {
        let mut ok = input();
        ok.title = "é".repeat(MAX_TITLE_CHARS);
        assert!(validate_new_review(ok).is_ok());

        let mut bad = input();
        bad.title = "a".repeat(MAX_TITLE_CHARS + 1);
        assert!(validate_new_review(bad).is_err());
    }
}
