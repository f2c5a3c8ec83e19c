use crate::error::PathError;

/// A parsed gRPC method path: `/{package}.{service}/{method}`
///
/// Example: `/greet.Greeter/SayHello`
/// - `package`: `greet`
/// - `service`: `Greeter`
/// - `method`: `SayHello`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrpcPath {
    pub package: String,
    pub service: String,
    pub method: String,
}

impl GrpcPath {
    /// Parse a gRPC path string. The leading slash is optional.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let path = path.strip_prefix('/').unwrap_or(path);

        let (service_path, method) = path
            .rsplit_once('/')
            .ok_or_else(|| PathError::Invalid(format!("gRPC path must contain '/': '{path}'")))?;

        let (package, service) = service_path.rsplit_once('.').ok_or_else(|| {
            PathError::Invalid(format!(
                "service path must contain package.service: '{service_path}'"
            ))
        })?;

        if package.is_empty() || service.is_empty() || method.is_empty() {
            return Err(PathError::Invalid(format!(
                "package, service, and method must all be non-empty: '{path}'"
            )));
        }

        Ok(GrpcPath {
            package: package.to_owned(),
            service: service.to_owned(),
            method: method.to_owned(),
        })
    }

    /// Returns the full service name: `{package}.{service}`
    pub fn full_service(&self) -> String {
        format!("{}.{}", self.package, self.service)
    }

    /// Returns the full gRPC path without the leading slash:
    /// `{package}.{service}/{method}`
    pub fn full_path(&self) -> String {
        format!("{}.{}/{}", self.package, self.service, self.method)
    }

    /// The same path with the method's first letter upper-cased.
    ///
    /// Some clients send lower-camel method names (`sayHello`) for methods
    /// registered as `SayHello`.
    pub fn capitalized(&self) -> Self {
        let mut chars = self.method.chars();
        let method = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        GrpcPath {
            package: self.package.clone(),
            service: self.service.clone(),
            method,
        }
    }
}
