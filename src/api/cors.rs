// 跨域规则：浏览器测速页可能与服务不同源，未配置的项全部放行。
use crate::config::CorsConfig;
use std::str::FromStr;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

#[derive(Debug, PartialEq)]
enum Rule<T> {
    Any,
    List(Vec<T>),
    /// 配置了列表但没有一项能解析，保持 tower-http 的默认（不放行）。
    Empty,
}

fn rule<T: FromStr>(values: Option<&[String]>) -> Rule<T> {
    let Some(values) = values else {
        return Rule::Any;
    };
    if values.iter().any(|value| value.trim() == "*") {
        return Rule::Any;
    }
    let parsed: Vec<T> = values
        .iter()
        .filter_map(|value| value.trim().parse().ok())
        .collect();
    if parsed.is_empty() {
        Rule::Empty
    } else {
        Rule::List(parsed)
    }
}

pub fn build_cors(config: &CorsConfig) -> CorsLayer {
    let cors = CorsLayer::new();
    let cors = match rule(config.allow_origins.as_deref()) {
        Rule::Any => cors.allow_origin(Any),
        Rule::List(origins) => cors.allow_origin(AllowOrigin::list(origins)),
        Rule::Empty => cors,
    };
    let cors = match rule(config.allow_methods.as_deref()) {
        Rule::Any => cors.allow_methods(Any),
        Rule::List(methods) => cors.allow_methods(AllowMethods::list(methods)),
        Rule::Empty => cors,
    };
    match rule(config.allow_headers.as_deref()) {
        Rule::Any => cors.allow_headers(Any),
        Rule::List(headers) => cors.allow_headers(AllowHeaders::list(headers)),
        Rule::Empty => cors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn unset_or_wildcard_allows_any() {
        assert_eq!(rule::<Method>(None), Rule::Any);
        let values = strings(&["GET", " * "]);
        assert_eq!(rule::<Method>(Some(&values)), Rule::Any);
    }

    #[test]
    fn listed_methods_are_parsed() {
        let values = strings(&["get", "POST", " OPTIONS "]);
        match rule::<Method>(Some(&values)) {
            Rule::List(methods) => {
                assert!(methods.contains(&Method::POST));
                assert!(methods.contains(&Method::OPTIONS));
                assert_eq!(methods.len(), 3);
            }
            other => panic!("unexpected rule: {other:?}"),
        }
    }

    #[test]
    fn unparsable_list_is_empty() {
        let values = strings(&["not a method"]);
        assert_eq!(rule::<Method>(Some(&values)), Rule::Empty);
    }

    #[test]
    fn layer_builds_from_shipped_defaults() {
        let config = CorsConfig {
            allow_origins: Some(strings(&["https://speed.example"])),
            allow_methods: Some(strings(&["GET", "POST"])),
            allow_headers: None,
        };
        let _layer = build_cors(&config);
    }
}
