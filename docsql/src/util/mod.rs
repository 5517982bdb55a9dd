/// Makes `name` usable as a single top-level field name: `.` and `$` would
/// otherwise be read as a path separator or an operator.
pub fn sanitize_field_name(name: &str) -> String {
    name.replace(['.', '$'], "_")
}
