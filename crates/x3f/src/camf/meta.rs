//! Typed lookups over a CAMF entry table and the file's own PROP section
//! (`spec.md` §4.9)
use crate::camf::entry::{CamfEntry, CamfMatrix, CamfValue, MatrixData, MatrixKind};
use crate::errors::{Result, X3fError};
use crate::matrix::Mat3;

/// Canonical white-balance names for `WhiteBalance` CAMF codes, per
/// `spec.md` §4.9. Anything outside this table, and the absence of the
/// entry itself, falls back to `"Auto"`.
const WB_NAMES: &[(u32, &str)] = &[
    (1, "Auto"),
    (2, "Sunlight"),
    (3, "Shadow"),
    (4, "Overcast"),
    (5, "Incandescent"),
    (6, "Florescent"),
    (7, "Flash"),
    (8, "Custom"),
    (11, "ColorTemp"),
    (12, "AutoLSP")
];

pub struct MetaAccess<'a> {
    camf: &'a [CamfEntry],
    /// The file's own `SECp` property list, already UTF-16LE→UTF-8 decoded.
    file_props: &'a [(String, String)]
}

impl<'a> MetaAccess<'a> {
    pub fn new(camf: &'a [CamfEntry], file_props: &'a [(String, String)]) -> Self {
        MetaAccess { camf, file_props }
    }

    fn find(&self, name: &'static str) -> Result<&'a CamfEntry> {
        self.camf.iter().find(|e| e.name == name).ok_or(X3fError::NotFound(name))
    }

    /// Like [`Self::find`], but for names resolved at runtime (e.g. a
    /// matrix name read out of a white-balance-keyed property list). The
    /// error loses the specific name since `X3fError::NotFound` only
    /// carries a `&'static str`.
    fn find_named(&self, name: &str) -> Result<&'a CamfEntry> {
        self.camf.iter().find(|e| e.name == name).ok_or(X3fError::NotFound("camf_entry"))
    }

    /// A 3-element float vector looked up by a dynamically-resolved name,
    /// for the white-balance matrix indirection in `spec.md` §4.14
    /// (`x3f_get_camf_matrix_for_wb`).
    pub fn get_float_vector_named(&self, name: &str) -> Result<[f64; 3]> {
        let entry = self.find_named(name)?;
        match &entry.value {
            CamfValue::Matrix(m) if m.dims == [3] => match &m.data {
                MatrixData::Float(v) => Ok([v[0], v[1], v[2]]),
                MatrixData::Int(v) => Ok([f64::from(v[0]), f64::from(v[1]), f64::from(v[2])]),
                MatrixData::UInt(v) => Ok([f64::from(v[0]), f64::from(v[1]), f64::from(v[2])])
            },
            _ => Err(X3fError::TypeMismatch { name: "camf_entry", expected: "3-vector" })
        }
    }

    /// A row-major 3x3 float matrix looked up by a dynamically-resolved
    /// name, same indirection as [`Self::get_float_vector_named`].
    pub fn get_matrix3x3_named(&self, name: &str) -> Result<Mat3> {
        let entry = self.find_named(name)?;
        match &entry.value {
            CamfValue::Matrix(m) if m.dims == [3, 3] => {
                let flat: Vec<f64> = match &m.data {
                    MatrixData::Float(v) => v.clone(),
                    MatrixData::Int(v) => v.iter().map(|&x| f64::from(x)).collect(),
                    MatrixData::UInt(v) => v.iter().map(|&x| f64::from(x)).collect()
                };
                Ok([[flat[0], flat[1], flat[2]], [flat[3], flat[4], flat[5]], [flat[6], flat[7], flat[8]]])
            }
            _ => Err(X3fError::TypeMismatch { name: "camf_entry", expected: "3x3 matrix" })
        }
    }

    /// A matrix of whatever shape the CAMF entry declares, for
    /// spatial-gain tables whose `(rows, cols, channels)` vary per camera
    /// and lens (`x3f_get_camf_matrix_var`, `spec.md` §4.13).
    pub fn get_matrix_any_named(&self, name: &str) -> Result<&'a CamfMatrix> {
        let entry = self.find_named(name)?;
        match &entry.value {
            CamfValue::Matrix(m) => Ok(m),
            _ => Err(X3fError::TypeMismatch { name: "camf_entry", expected: "matrix" })
        }
    }

    /// Like [`Self::get_property_list`], but the list name itself may be
    /// resolved at runtime (spatial-gain block names discovered via
    /// `IncludeBlocks` are themselves used as property-list names).
    pub fn get_property_list_named(&self, name: &str) -> Result<&'a [(String, String)]> {
        let entry = self.find_named(name)?;
        match &entry.value {
            CamfValue::PropertyList(pairs) => Ok(pairs),
            _ => Err(X3fError::TypeMismatch { name: "camf_entry", expected: "property list" })
        }
    }

    /// Like [`Self::get_property`], but for a dynamically-resolved list
    /// name.
    pub fn get_property_named(&self, list: &str, key: &str) -> Result<&'a str> {
        let pairs = self.get_property_list_named(list)?;
        pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str()).ok_or(X3fError::NotFound("camf_entry"))
    }

    pub fn get_matrix(&self, name: &'static str, dims: &[u32], kind: MatrixKind) -> Result<&'a MatrixData> {
        let entry = self.find(name)?;
        match &entry.value {
            CamfValue::Matrix(m) if m.dims == dims && m.kind == kind => Ok(&m.data),
            CamfValue::Matrix(m) => Err(X3fError::ShapeMismatch {
                expected: (dims.iter().product::<u32>() as usize, dims.len()),
                found: (m.dims.iter().product::<u32>() as usize, m.dims.len())
            }),
            _ => Err(X3fError::TypeMismatch { name, expected: "matrix" })
        }
    }

    pub fn get_float(&self, name: &'static str) -> Result<f64> {
        let entry = self.find(name)?;
        match &entry.value {
            CamfValue::Matrix(m) if m.dims.iter().product::<u32>() == 1 => match &m.data {
                MatrixData::Float(v) => Ok(v[0]),
                MatrixData::Int(v) => Ok(f64::from(v[0])),
                MatrixData::UInt(v) => Ok(f64::from(v[0]))
            },
            _ => Err(X3fError::TypeMismatch { name, expected: "scalar float" })
        }
    }

    pub fn get_unsigned(&self, name: &'static str) -> Result<u32> {
        let entry = self.find(name)?;
        match &entry.value {
            CamfValue::Matrix(m) if m.dims.iter().product::<u32>() == 1 => match &m.data {
                MatrixData::UInt(v) => Ok(v[0]),
                MatrixData::Int(v) => Ok(v[0] as u32),
                MatrixData::Float(_) => Err(X3fError::TypeMismatch { name, expected: "scalar unsigned" })
            },
            _ => Err(X3fError::TypeMismatch { name, expected: "scalar unsigned" })
        }
    }

    pub fn get_signed(&self, name: &'static str) -> Result<i32> {
        let entry = self.find(name)?;
        match &entry.value {
            CamfValue::Matrix(m) if m.dims.iter().product::<u32>() == 1 => match &m.data {
                MatrixData::Int(v) => Ok(v[0]),
                MatrixData::UInt(v) => Ok(v[0] as i32),
                MatrixData::Float(_) => Err(X3fError::TypeMismatch { name, expected: "scalar signed" })
            },
            _ => Err(X3fError::TypeMismatch { name, expected: "scalar signed" })
        }
    }

    pub fn get_float_vector(&self, name: &'static str) -> Result<[f64; 3]> {
        let data = self.get_matrix(name, &[3], MatrixKind::Float)?;
        match data {
            MatrixData::Float(v) => Ok([v[0], v[1], v[2]]),
            _ => unreachable!("get_matrix enforced MatrixKind::Float")
        }
    }

    pub fn get_unsigned_vector(&self, name: &'static str) -> Result<[u32; 3]> {
        let entry = self.find(name)?;
        match &entry.value {
            CamfValue::Matrix(m) if m.dims == [3] => match &m.data {
                MatrixData::UInt(v) => Ok([v[0], v[1], v[2]]),
                MatrixData::Int(v) => Ok([v[0] as u32, v[1] as u32, v[2] as u32]),
                MatrixData::Float(_) => Err(X3fError::TypeMismatch { name, expected: "3-vector" })
            },
            _ => Err(X3fError::TypeMismatch { name, expected: "3-vector" })
        }
    }

    /// A 4-element unsigned vector, used for rectangles stored as
    /// `(col0, row0, col1, row1)` (`KeepImageArea`, `ActiveImageArea`,
    /// `DarkShieldTop`/`DarkShieldBottom`).
    pub fn get_unsigned_quad(&self, name: &'static str) -> Result<[u32; 4]> {
        let entry = self.find(name)?;
        match &entry.value {
            CamfValue::Matrix(m) if m.dims == [4] => match &m.data {
                MatrixData::UInt(v) => Ok([v[0], v[1], v[2], v[3]]),
                MatrixData::Int(v) => Ok([v[0] as u32, v[1] as u32, v[2] as u32, v[3] as u32]),
                MatrixData::Float(_) => Err(X3fError::TypeMismatch { name, expected: "4-vector" })
            },
            _ => Err(X3fError::TypeMismatch { name, expected: "4-vector" })
        }
    }

    pub fn get_property_list(&self, name: &'static str) -> Result<&'a [(String, String)]> {
        let entry = self.find(name)?;
        match &entry.value {
            CamfValue::PropertyList(pairs) => Ok(pairs),
            _ => Err(X3fError::TypeMismatch { name, expected: "property list" })
        }
    }

    pub fn get_property(&self, list: &'static str, key: &str) -> Result<&'a str> {
        let pairs = self.get_property_list(list)?;
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .ok_or(X3fError::NotFound(list))
    }

    /// Look up an entry in the file's own `SECp` property list (UTF-8).
    pub fn get_prop_entry(&self, key: &str) -> Option<&'a str> {
        self.file_props.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Resolve the effective white balance name: CAMF `WhiteBalance` code
    /// if present, otherwise the header's own string, otherwise `"Auto"`.
    pub fn get_wb(&self, header_white_balance: Option<&str>) -> String {
        if let Ok(code) = self.get_unsigned("WhiteBalance") {
            let name = WB_NAMES.iter().find(|&&(c, _)| c == code).map(|&(_, n)| n).unwrap_or("Auto");
            return name.to_string();
        }
        header_white_balance.unwrap_or("Auto").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camf::entry::CamfMatrix;

    fn scalar_entry(name: &str, value: u32) -> CamfEntry {
        CamfEntry {
            name: name.to_string(),
            value: CamfValue::Matrix(CamfMatrix {
                dims: vec![1],
                dim_names: vec!["n".to_string()],
                kind: MatrixKind::UInt,
                data: MatrixData::UInt(vec![value])
            })
        }
    }

    #[test]
    fn get_wb_maps_known_code() {
        let camf = [scalar_entry("WhiteBalance", 5)];
        let meta = MetaAccess::new(&camf, &[]);
        assert_eq!(meta.get_wb(Some("ignored")), "Incandescent");
    }

    #[test]
    fn get_wb_falls_back_to_header_string() {
        let meta = MetaAccess::new(&[], &[]);
        assert_eq!(meta.get_wb(Some("Daylight")), "Daylight");
    }

    #[test]
    fn get_wb_defaults_to_auto() {
        let meta = MetaAccess::new(&[], &[]);
        assert_eq!(meta.get_wb(None), "Auto");
    }

    #[test]
    fn get_unsigned_not_found() {
        let meta = MetaAccess::new(&[], &[]);
        assert!(matches!(meta.get_unsigned("Missing"), Err(X3fError::NotFound("Missing"))));
    }

    #[test]
    fn get_unsigned_quad_reads_rect() {
        let camf = [CamfEntry {
            name: "KeepImageArea".to_string(),
            value: CamfValue::Matrix(CamfMatrix {
                dims: vec![4],
                dim_names: vec!["n".to_string()],
                kind: MatrixKind::UInt,
                data: MatrixData::UInt(vec![4, 8, 1900, 1260])
            })
        }];
        let meta = MetaAccess::new(&camf, &[]);
        assert_eq!(meta.get_unsigned_quad("KeepImageArea").unwrap(), [4, 8, 1900, 1260]);
    }

    #[test]
    fn get_float_vector_named_reads_dynamically_resolved_matrix() {
        let camf = [CamfEntry {
            name: "CustomGains".to_string(),
            value: CamfValue::Matrix(CamfMatrix {
                dims: vec![3],
                dim_names: vec!["n".to_string()],
                kind: MatrixKind::Float,
                data: MatrixData::Float(vec![1.5, 1.0, 2.25])
            })
        }];
        let meta = MetaAccess::new(&camf, &[]);
        let name = String::from("CustomGains");
        assert_eq!(meta.get_float_vector_named(&name).unwrap(), [1.5, 1.0, 2.25]);
    }

    #[test]
    fn get_matrix_any_named_returns_whatever_shape_is_stored() {
        let camf = [CamfEntry {
            name: "SpatialGain".to_string(),
            value: CamfValue::Matrix(CamfMatrix {
                dims: vec![2, 3],
                dim_names: vec!["row".to_string(), "col".to_string()],
                kind: MatrixKind::Float,
                data: MatrixData::Float(vec![1.0; 6])
            })
        }];
        let meta = MetaAccess::new(&camf, &[]);
        let m = meta.get_matrix_any_named("SpatialGain").unwrap();
        assert_eq!(m.dims, vec![2, 3]);
    }

    #[test]
    fn get_property_looks_up_key_in_named_list() {
        let camf = [CamfEntry {
            name: "WBGainsLists".to_string(),
            value: CamfValue::PropertyList(vec![("Daylight".to_string(), "1.0 1.0 1.0".to_string())])
        }];
        let meta = MetaAccess::new(&camf, &[]);
        assert_eq!(meta.get_property("WBGainsLists", "Daylight").unwrap(), "1.0 1.0 1.0");
    }
}
