use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(axum_helpers::ErrorResponse, axum_helpers::HealthResponse)
    ),
    info(
        title = "Users API",
        version = "0.1.0",
        description = "User accounts and role assignments"
    ),
    servers(
        (url = "/api", description = "API base path")
    ),
    nest(
        (path = "/users", api = domain_users::handlers::ApiDoc)
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_users_paths_are_documented() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;

        assert!(paths.contains_key("/users"), "paths: {:?}", paths.keys());
        assert!(paths.contains_key("/users/{id}"));

        let item = &paths["/users/{id}"];
        assert!(item.get.is_some());
        assert!(item.put.is_some());
        assert!(item.patch.is_some());
        assert!(item.delete.is_some());
    }

    #[test]
    fn test_put_and_patch_document_the_same_responses() {
        let doc = ApiDoc::openapi();
        let item = &doc.paths.paths["/users/{id}"];

        let statuses = |op: &Option<utoipa::openapi::path::Operation>| -> Vec<String> {
            op.as_ref()
                .map(|op| op.responses.responses.keys().cloned().collect())
                .unwrap_or_default()
        };

        let put = statuses(&item.put);
        assert_eq!(put, statuses(&item.patch));
        assert!(put.contains(&"401".to_string()));
        assert!(put.contains(&"500".to_string()));
    }
}
