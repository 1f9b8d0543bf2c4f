//! HTTP client for end-to-end tests
//!
//! Wraps reqwest and provides one method per review endpoint.
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

/// HTTP test client acting on behalf of one user
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    /// Creates a client that sends no identity header
    pub fn anonymous(base_url: String) -> Self {
        Self::build(base_url, HeaderMap::new())
    }

    /// Creates a client that identifies every request as `user_id`
    pub fn as_user(base_url: String, user_id: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-User-Id",
            HeaderValue::from_str(user_id).expect("Invalid user id header"),
        );
        Self::build(base_url, headers)
    }

    fn build(base_url: String, headers: HeaderMap) -> Self {
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Reviews by subject
    // ========================================================================

    /// PUT /v1/reviews/subject/{subject_id}
    pub async fn submit_review(
        &self,
        subject_id: &str,
        opinion: &str,
        description: &str,
        position: Option<i64>,
    ) -> Response {
        let mut body = json!({ "opinion": opinion, "description": description });
        if let Some(position) = position {
            body["position"] = json!(position);
        }
        self.client
            .put(format!("{}/v1/reviews/subject/{}", self.base_url, subject_id))
            .json(&body)
            .send()
            .await
            .expect("Submit review request failed")
    }

    /// GET /v1/reviews/subject/{subject_id}
    pub async fn get_subject_review(&self, subject_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/reviews/subject/{}", self.base_url, subject_id))
            .send()
            .await
            .expect("Get subject review request failed")
    }

    /// DELETE /v1/reviews/subject/{subject_id}
    pub async fn delete_subject_review(&self, subject_id: &str) -> Response {
        self.client
            .delete(format!("{}/v1/reviews/subject/{}", self.base_url, subject_id))
            .send()
            .await
            .expect("Delete subject review request failed")
    }

    // ========================================================================
    // Reviews by id
    // ========================================================================

    /// GET /v1/reviews/{review_id}
    pub async fn get_review(&self, review_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/reviews/{}", self.base_url, review_id))
            .send()
            .await
            .expect("Get review request failed")
    }

    /// DELETE /v1/reviews/{review_id}
    pub async fn delete_review(&self, review_id: &str) -> Response {
        self.client
            .delete(format!("{}/v1/reviews/{}", self.base_url, review_id))
            .send()
            .await
            .expect("Delete review request failed")
    }

    /// PUT /v1/reviews/{review_id}/description
    pub async fn edit_description(&self, review_id: &str, description: &str) -> Response {
        self.client
            .put(format!("{}/v1/reviews/{}/description", self.base_url, review_id))
            .json(&json!({ "description": description }))
            .send()
            .await
            .expect("Edit description request failed")
    }

    /// PUT /v1/reviews/{review_id}/opinion
    pub async fn change_opinion(
        &self,
        review_id: &str,
        opinion: &str,
        position: Option<i64>,
    ) -> Response {
        self.client
            .put(format!("{}/v1/reviews/{}/opinion", self.base_url, review_id))
            .json(&json!({ "opinion": opinion, "position": position }))
            .send()
            .await
            .expect("Change opinion request failed")
    }

    /// PUT /v1/reviews/{review_id}/rank
    pub async fn reorder_review(&self, review_id: &str, position: i64) -> Response {
        self.client
            .put(format!("{}/v1/reviews/{}/rank", self.base_url, review_id))
            .json(&json!({ "position": position }))
            .send()
            .await
            .expect("Reorder review request failed")
    }

    // ========================================================================
    // Lists
    // ========================================================================

    /// GET /v1/reviews/ranked
    pub async fn get_ranked_list(&self, tier: Option<&str>) -> Response {
        let mut request = self
            .client
            .get(format!("{}/v1/reviews/ranked", self.base_url));
        if let Some(tier) = tier {
            request = request.query(&[("tier", tier)]);
        }
        request.send().await.expect("Ranked list request failed")
    }

    /// GET /v1/users/{user_id}/ranked
    pub async fn get_user_ranked_list(&self, user_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/users/{}/ranked", self.base_url, user_id))
            .send()
            .await
            .expect("User ranked list request failed")
    }

    /// GET /v1/reviews/mine
    pub async fn get_own_reviews(&self, opinions: Option<&str>) -> Response {
        let mut request = self.client.get(format!("{}/v1/reviews/mine", self.base_url));
        if let Some(opinions) = opinions {
            request = request.query(&[("opinions", opinions)]);
        }
        request.send().await.expect("Own reviews request failed")
    }

    /// POST /v1/reviews/subjects
    pub async fn get_reviews_for_subjects(&self, subject_ids: &[&str]) -> Response {
        self.client
            .post(format!("{}/v1/reviews/subjects", self.base_url))
            .json(&json!({ "subjectIds": subject_ids }))
            .send()
            .await
            .expect("Subjects reviews request failed")
    }

    /// GET /metrics
    pub async fn get_metrics(&self) -> Response {
        self.client
            .get(format!("{}/metrics", self.base_url))
            .send()
            .await
            .expect("Metrics request failed")
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Submits a review and returns its JSON, asserting success
    pub async fn submit_ok(
        &self,
        subject_id: &str,
        opinion: &str,
        position: Option<i64>,
    ) -> Value {
        let response = self.submit_review(subject_id, opinion, "", position).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::OK,
            "Submitting {} failed",
            subject_id
        );
        response.json().await.expect("Invalid review JSON")
    }

    /// Returns (subjectId, rank, rating) of the caller's ranked reviews
    pub async fn ranked_rows(&self, tier: Option<&str>) -> Vec<(String, u64, f64)> {
        let response = self.get_ranked_list(tier).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let list: Vec<Value> = response.json().await.expect("Invalid list JSON");
        list.iter()
            .map(|review| {
                (
                    review["subjectId"].as_str().unwrap_or_default().to_string(),
                    review["rank"].as_u64().unwrap_or(u64::MAX),
                    review["rating"].as_f64().unwrap_or(f64::NAN),
                )
            })
            .collect()
    }
}
