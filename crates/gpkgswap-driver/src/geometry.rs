/// Human-readable name for a `gpkg_geometry_columns.geometry_type_name` value.
///
/// `z` and `m` follow the GeoPackage flags: 0 prohibited, 1 mandatory, 2 optional.
pub fn display_geometry_type(type_name: &str, z: i64, m: i64) -> String {
    let base = match type_name.trim().to_ascii_uppercase().as_str() {
        "GEOMETRY" => "Unknown (any)".to_string(),
        "POINT" => "Point".to_string(),
        "LINESTRING" => "Line String".to_string(),
        "POLYGON" => "Polygon".to_string(),
        "MULTIPOINT" => "Multi Point".to_string(),
        "MULTILINESTRING" => "Multi Line String".to_string(),
        "MULTIPOLYGON" => "Multi Polygon".to_string(),
        "GEOMETRYCOLLECTION" => "Geometry Collection".to_string(),
        "CIRCULARSTRING" => "Circular String".to_string(),
        "COMPOUNDCURVE" => "Compound Curve".to_string(),
        "CURVEPOLYGON" => "Curve Polygon".to_string(),
        "MULTICURVE" => "Multi Curve".to_string(),
        "MULTISURFACE" => "Multi Surface".to_string(),
        "CURVE" => "Curve".to_string(),
        "SURFACE" => "Surface".to_string(),
        _ => type_name.trim().to_string(),
    };

    match (z == 1, m == 1) {
        (true, true) => format!("3D Measured {base}"),
        (true, false) => format!("3D {base}"),
        (false, true) => format!("Measured {base}"),
        (false, false) => base,
    }
}
