//! Format decoders
//!
//! Every decoder produces the same [`DecodedModel`]: a node list in parent
//! before child order, flat triangle meshes, simple diffuse materials and
//! the RGBA images they reference. Nothing here touches the scene or the GPU,
//! so decoding can run on a worker thread.

use std::io::Cursor;
use std::path::Path;

use cgmath::{Quaternion, Vector3};

use super::ModelFormat;
use crate::error::AssetDecodeError;
use crate::gfx::resources::TextureImage;
use crate::gfx::scene::Transform;

/// Base color used when a mesh has no material
pub const DEFAULT_BASE_COLOR: [f32; 4] = [0.8, 0.8, 0.8, 1.0];

#[derive(Debug, Clone)]
pub struct DecodedNode {
    pub name: String,
    /// Index of the parent in [`DecodedModel::nodes`]; always lower than the
    /// node's own index
    pub parent: Option<usize>,
    pub transform: Transform,
    /// Indices into [`DecodedModel::meshes`]
    pub meshes: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct DecodedMesh {
    pub name: String,
    pub positions: Vec<f32>,
    /// Empty when the source has none
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
    pub indices: Vec<u32>,
    pub material: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct DecodedMaterial {
    pub name: String,
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    /// Index into [`DecodedModel::images`]
    pub diffuse_image: Option<usize>,
}

impl Default for DecodedMaterial {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_color: DEFAULT_BASE_COLOR,
            emissive: [0.0, 0.0, 0.0],
            diffuse_image: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecodedModel {
    pub nodes: Vec<DecodedNode>,
    pub meshes: Vec<DecodedMesh>,
    pub materials: Vec<DecodedMaterial>,
    pub images: Vec<TextureImage>,
}

impl DecodedModel {
    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.indices.len() / 3).sum()
    }

    /// Checks every cross reference so instantiation can index freely
    pub fn validate(&self, format: ModelFormat) -> Result<(), AssetDecodeError> {
        let malformed = |message: String| AssetDecodeError::malformed(format, message);

        for (i, node) in self.nodes.iter().enumerate() {
            if node.parent.is_some_and(|p| p >= i) {
                return Err(malformed(format!("node {} is listed before its parent", i)));
            }
            if let Some(mesh) = node.meshes.iter().find(|m| **m >= self.meshes.len()) {
                return Err(malformed(format!("node {} references missing mesh {}", i, mesh)));
            }
        }

        for mesh in &self.meshes {
            if mesh.positions.len() % 3 != 0 || mesh.indices.len() % 3 != 0 {
                return Err(malformed(format!("mesh '{}' has truncated attributes", mesh.name)));
            }
            let vertex_count = (mesh.positions.len() / 3) as u32;
            if mesh.indices.iter().any(|i| *i >= vertex_count) {
                return Err(malformed(format!("mesh '{}' indexes past its vertices", mesh.name)));
            }
            if mesh.material.is_some_and(|m| m >= self.materials.len()) {
                return Err(malformed(format!("mesh '{}' references a missing material", mesh.name)));
            }
        }

        for material in &self.materials {
            if material.diffuse_image.is_some_and(|i| i >= self.images.len()) {
                return Err(malformed(format!(
                    "material '{}' references a missing image",
                    material.name
                )));
            }
        }

        if self.triangle_count() == 0 {
            return Err(AssetDecodeError::Empty);
        }
        Ok(())
    }
}

/// Decodes `bytes` as `format`. `base_dir` resolves sibling files (mtl
/// libraries, external textures and buffers) for models read from disk.
pub fn decode_model(
    format: ModelFormat,
    bytes: &[u8],
    base_dir: Option<&Path>,
) -> Result<DecodedModel, AssetDecodeError> {
    let model = match format {
        ModelFormat::Obj => decode_obj(bytes, base_dir)?,
        ModelFormat::Gltf => decode_gltf(bytes, base_dir)?,
        ModelFormat::Stl => decode_stl(bytes)?,
        ModelFormat::Fbx => decode_fbx(bytes)?,
    };
    model.validate(format)?;
    Ok(model)
}

fn load_image_file(path: &Path) -> Option<TextureImage> {
    match image::open(path) {
        Ok(img) => {
            let rgba = img.to_rgba8();
            Some(TextureImage::new(rgba.width(), rgba.height(), rgba.into_raw()))
        }
        Err(e) => {
            log::warn!("Skipping texture {}: {}", path.display(), e);
            None
        }
    }
}

// ----------------------------------------------------------------------------
// OBJ
// ----------------------------------------------------------------------------

fn decode_obj(bytes: &[u8], base_dir: Option<&Path>) -> Result<DecodedModel, AssetDecodeError> {
    let mut reader = Cursor::new(bytes);
    let (models, materials) = tobj::load_obj_buf(
        &mut reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |mtl_path| match base_dir {
            Some(dir) => tobj::load_mtl(dir.join(mtl_path)),
            None => Err(tobj::LoadError::OpenFileFailed),
        },
    )
    .map_err(|e| AssetDecodeError::malformed(ModelFormat::Obj, e))?;

    let materials = materials.unwrap_or_else(|e| {
        log::debug!("No MTL library available ({}), using default materials", e);
        Vec::new()
    });

    let mut decoded = DecodedModel::default();

    for (i, mtl) in materials.iter().enumerate() {
        let diffuse = mtl.diffuse.unwrap_or([0.8, 0.8, 0.8]);
        let diffuse_image = match (&mtl.diffuse_texture, base_dir) {
            (Some(texture), Some(dir)) => load_image_file(&dir.join(texture)).map(|image| {
                decoded.images.push(image);
                decoded.images.len() - 1
            }),
            _ => None,
        };

        decoded.materials.push(DecodedMaterial {
            name: if mtl.name.is_empty() {
                format!("material_{}", i)
            } else {
                mtl.name.clone()
            },
            base_color: [diffuse[0], diffuse[1], diffuse[2], mtl.dissolve.unwrap_or(1.0)],
            emissive: [0.0, 0.0, 0.0],
            diffuse_image,
        });
    }

    for (i, model) in models.into_iter().enumerate() {
        let name = if model.name.is_empty() {
            format!("mesh_{}", i)
        } else {
            model.name
        };
        let mesh = model.mesh;

        decoded.nodes.push(DecodedNode {
            name: name.clone(),
            parent: None,
            transform: Transform::default(),
            meshes: vec![decoded.meshes.len()],
        });
        decoded.meshes.push(DecodedMesh {
            name,
            positions: mesh.positions,
            normals: mesh.normals,
            uvs: mesh.texcoords,
            indices: mesh.indices,
            material: mesh.material_id.filter(|m| *m < decoded.materials.len()),
        });
    }

    Ok(decoded)
}

// ----------------------------------------------------------------------------
// glTF / GLB
// ----------------------------------------------------------------------------

fn gltf_image(data: &gltf::image::Data) -> Option<TextureImage> {
    match data.format {
        gltf::image::Format::R8G8B8A8 => Some(TextureImage::new(
            data.width,
            data.height,
            data.pixels.clone(),
        )),
        gltf::image::Format::R8G8B8 => Some(TextureImage::from_rgb(
            data.width,
            data.height,
            &data.pixels,
        )),
        other => {
            log::warn!("Unsupported glTF image format {:?}", other);
            None
        }
    }
}

fn decode_gltf(bytes: &[u8], base_dir: Option<&Path>) -> Result<DecodedModel, AssetDecodeError> {
    let malformed = |e: gltf::Error| AssetDecodeError::malformed(ModelFormat::Gltf, e);

    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(bytes).map_err(malformed)?;
    let buffers = gltf::import_buffers(&document, base_dir, blob).map_err(malformed)?;
    let images = gltf::import_images(&document, base_dir, &buffers).map_err(malformed)?;

    let mut decoded = DecodedModel::default();

    // Unsupported pixel formats become white so image indices stay aligned
    decoded.images = images
        .iter()
        .map(|data| gltf_image(data).unwrap_or_else(|| TextureImage::solid([255, 255, 255, 255])))
        .collect();

    for material in document.materials() {
        let pbr = material.pbr_metallic_roughness();
        decoded.materials.push(DecodedMaterial {
            name: material
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("material_{}", decoded.materials.len())),
            base_color: pbr.base_color_factor(),
            emissive: material.emissive_factor(),
            diffuse_image: pbr
                .base_color_texture()
                .map(|info| info.texture().source().index()),
        });
    }

    // glTF mesh index -> decoded meshes (one per triangle primitive)
    let mut mesh_map: Vec<Vec<usize>> = Vec::new();
    for mesh in document.meshes() {
        let mesh_name = mesh
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("mesh_{}", mesh.index()));
        let mut primitives = Vec::new();

        for (p, primitive) in mesh.primitives().enumerate() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Skipping {:?} primitive in mesh {}",
                    primitive.mode(),
                    mesh_name
                );
                continue;
            }

            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &d.0[..]));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<f32> = positions.flatten().collect();
            let normals = reader
                .read_normals()
                .map(|n| n.flatten().collect())
                .unwrap_or_default();
            let uvs = reader
                .read_tex_coords(0)
                .map(|t| t.into_f32().flatten().collect())
                .unwrap_or_default();
            let indices = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..(positions.len() / 3) as u32).collect(),
            };

            primitives.push(decoded.meshes.len());
            decoded.meshes.push(DecodedMesh {
                name: if mesh.primitives().len() > 1 {
                    format!("{}_{}", mesh_name, p)
                } else {
                    mesh_name.clone()
                },
                positions,
                normals,
                uvs,
                indices,
                material: primitive.material().index(),
            });
        }
        mesh_map.push(primitives);
    }

    let Some(scene) = document.default_scene().or_else(|| document.scenes().next()) else {
        // No scene: show every mesh at the origin
        for (i, primitives) in mesh_map.into_iter().enumerate() {
            decoded.nodes.push(DecodedNode {
                name: format!("mesh_{}", i),
                parent: None,
                transform: Transform::default(),
                meshes: primitives,
            });
        }
        return Ok(decoded);
    };

    // Gltf node iterators only run forwards; reverse on the stack instead
    let mut stack: Vec<(gltf::Node, Option<usize>)> = scene.nodes().map(|n| (n, None)).collect();
    stack.reverse();
    while let Some((node, parent)) = stack.pop() {
        let (t, r, s) = node.transform().decomposed();
        let index = decoded.nodes.len();
        decoded.nodes.push(DecodedNode {
            name: node
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("node_{}", node.index())),
            parent,
            transform: Transform {
                translation: Vector3::from(t),
                rotation: Quaternion::new(r[3], r[0], r[1], r[2]),
                scale: Vector3::from(s),
            },
            meshes: node
                .mesh()
                .and_then(|m| mesh_map.get(m.index()).cloned())
                .unwrap_or_default(),
        });
        let first_child = stack.len();
        stack.extend(node.children().map(|child| (child, Some(index))));
        stack[first_child..].reverse();
    }

    Ok(decoded)
}

// ----------------------------------------------------------------------------
// STL
// ----------------------------------------------------------------------------

const STL_HEADER_LEN: usize = 80;
const STL_TRIANGLE_LEN: usize = 50;

fn is_binary_stl(bytes: &[u8]) -> bool {
    if bytes.len() < STL_HEADER_LEN + 4 {
        return false;
    }
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    // Some exporters write "solid" into binary headers, so trust the size
    bytes.len() == STL_HEADER_LEN + 4 + count * STL_TRIANGLE_LEN
}

fn decode_stl(bytes: &[u8]) -> Result<DecodedModel, AssetDecodeError> {
    let (positions, normals) = if is_binary_stl(bytes) {
        parse_binary_stl(bytes)
    } else if bytes.trim_ascii_start().starts_with(b"solid") {
        parse_ascii_stl(bytes)?
    } else {
        return Err(AssetDecodeError::malformed(
            ModelFormat::Stl,
            "neither ASCII nor a consistent binary STL",
        ));
    };

    let vertex_count = positions.len() / 3;
    let mut decoded = DecodedModel::default();
    decoded.nodes.push(DecodedNode {
        name: "stl".to_string(),
        parent: None,
        transform: Transform::default(),
        meshes: vec![0],
    });
    decoded.meshes.push(DecodedMesh {
        name: "stl".to_string(),
        // Facet normals of zero length are recomputed from the faces
        normals: if normals.chunks_exact(3).any(|n| n == [0.0, 0.0, 0.0]) {
            Vec::new()
        } else {
            normals
        },
        positions,
        uvs: Vec::new(),
        indices: (0..vertex_count as u32).collect(),
        material: None,
    });
    Ok(decoded)
}

fn parse_binary_stl(bytes: &[u8]) -> (Vec<f32>, Vec<f32>) {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let read_f32 = |b: &[u8], at: usize| f32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]]);

    for triangle in bytes[STL_HEADER_LEN + 4..].chunks_exact(STL_TRIANGLE_LEN) {
        let normal = [read_f32(triangle, 0), read_f32(triangle, 4), read_f32(triangle, 8)];
        for v in 0..3 {
            let at = 12 + v * 12;
            positions.extend([
                read_f32(triangle, at),
                read_f32(triangle, at + 4),
                read_f32(triangle, at + 8),
            ]);
            normals.extend(normal);
        }
    }
    (positions, normals)
}

fn parse_ascii_stl(bytes: &[u8]) -> Result<(Vec<f32>, Vec<f32>), AssetDecodeError> {
    let malformed = |message: String| AssetDecodeError::malformed(ModelFormat::Stl, message);
    let text = std::str::from_utf8(bytes).map_err(|e| malformed(e.to_string()))?;

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut facet_normal = [0.0f32; 3];
    let mut facet_vertices = 0;

    let parse_xyz = |parts: &mut std::str::SplitWhitespace, line: usize| -> Result<[f32; 3], AssetDecodeError> {
        let mut xyz = [0.0; 3];
        for c in &mut xyz {
            *c = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| malformed(format!("bad number on line {}", line + 1)))?;
        }
        Ok(xyz)
    };

    for (line_no, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("facet") => {
                if parts.next() != Some("normal") {
                    return Err(malformed(format!("expected 'facet normal' on line {}", line_no + 1)));
                }
                facet_normal = parse_xyz(&mut parts, line_no)?;
                facet_vertices = 0;
            }
            Some("vertex") => {
                positions.extend(parse_xyz(&mut parts, line_no)?);
                normals.extend(facet_normal);
                facet_vertices += 1;
            }
            Some("endfacet") if facet_vertices != 3 => {
                return Err(malformed(format!(
                    "facet ending on line {} has {} vertices",
                    line_no + 1,
                    facet_vertices
                )));
            }
            _ => {}
        }
    }

    Ok((positions, normals))
}

// ----------------------------------------------------------------------------
// FBX
// ----------------------------------------------------------------------------

#[cfg(not(feature = "fbx"))]
fn decode_fbx(_bytes: &[u8]) -> Result<DecodedModel, AssetDecodeError> {
    Err(AssetDecodeError::Unsupported(ModelFormat::Fbx))
}

#[cfg(feature = "fbx")]
fn decode_fbx(bytes: &[u8]) -> Result<DecodedModel, AssetDecodeError> {
    use cgmath::{InnerSpace, Matrix3};
    use russimp::material::PropertyTypeInfo;
    use russimp::scene::{PostProcess, Scene as RScene};

    let scene = RScene::from_buffer(
        bytes,
        vec![
            PostProcess::Triangulate,
            PostProcess::GenerateSmoothNormals,
            PostProcess::JoinIdenticalVertices,
            PostProcess::FlipUVs,
        ],
        "fbx",
    )
    .map_err(|e| AssetDecodeError::malformed(ModelFormat::Fbx, format!("{:?}", e)))?;

    let mut decoded = DecodedModel::default();

    for (i, material) in scene.materials.iter().enumerate() {
        let color = |key: &str| {
            material.properties.iter().find_map(|p| match &p.data {
                PropertyTypeInfo::FloatArray(f) if p.key == key && f.len() >= 3 => {
                    Some([f[0], f[1], f[2], f.get(3).copied().unwrap_or(1.0)])
                }
                _ => None,
            })
        };
        let base = color("$clr.diffuse")
            .or_else(|| color("$clr.base"))
            .unwrap_or(DEFAULT_BASE_COLOR);
        let emissive = color("$clr.emissive").unwrap_or([0.0; 4]);

        decoded.materials.push(DecodedMaterial {
            name: format!("material_{}", i),
            base_color: base,
            emissive: [emissive[0], emissive[1], emissive[2]],
            diffuse_image: None,
        });
    }

    for (i, mesh) in scene.meshes.iter().enumerate() {
        let uvs = mesh
            .texture_coords
            .first()
            .and_then(|channel| channel.as_ref())
            .map(|coords| coords.iter().flat_map(|t| [t.x, t.y]).collect())
            .unwrap_or_default();

        decoded.meshes.push(DecodedMesh {
            name: if mesh.name.is_empty() {
                format!("mesh_{}", i)
            } else {
                mesh.name.clone()
            },
            positions: mesh.vertices.iter().flat_map(|v| [v.x, v.y, v.z]).collect(),
            normals: mesh.normals.iter().flat_map(|n| [n.x, n.y, n.z]).collect(),
            uvs,
            indices: mesh
                .faces
                .iter()
                .filter(|f| f.0.len() == 3)
                .flat_map(|f| f.0.iter().copied())
                .collect(),
            material: Some(mesh.material_index as usize)
                .filter(|m| *m < decoded.materials.len()),
        });
    }

    let Some(root) = scene.root.clone() else {
        return Ok(decoded);
    };

    let mut stack = vec![(root, None)];
    while let Some((node, parent)) = stack.pop() {
        let t = &node.transformation;
        let translation = Vector3::new(t.a4, t.b4, t.c4);
        let columns = [
            Vector3::new(t.a1, t.b1, t.c1),
            Vector3::new(t.a2, t.b2, t.c2),
            Vector3::new(t.a3, t.b3, t.c3),
        ];
        let scale = Vector3::new(
            columns[0].magnitude(),
            columns[1].magnitude(),
            columns[2].magnitude(),
        );
        let safe = |v: Vector3<f32>, s: f32| if s > 0.0 { v / s } else { v };
        let rotation = Quaternion::from(Matrix3::from_cols(
            safe(columns[0], scale.x),
            safe(columns[1], scale.y),
            safe(columns[2], scale.z),
        ));

        let index = decoded.nodes.len();
        decoded.nodes.push(DecodedNode {
            name: node.name.clone(),
            parent,
            transform: Transform {
                translation,
                rotation,
                scale,
            },
            meshes: node.meshes.iter().map(|m| *m as usize).collect(),
        });
        for child in node.children.borrow().iter().rev() {
            stack.push((child.clone(), Some(index)));
        }
    }

    Ok(decoded)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const CUBE_OBJ: &str = "\
o cube
v -1 -1 -1
v  1 -1 -1
v  1  1 -1
v -1  1 -1
v -1 -1  1
v  1 -1  1
v  1  1  1
v -1  1  1
f 1 2 3 4
f 5 8 7 6
f 1 5 6 2
f 2 6 7 3
f 3 7 8 4
f 5 1 4 8
";

    /// A cube of half-extent `half` as OBJ text
    pub(crate) fn cube_obj(half: f32) -> String {
        CUBE_OBJ
            .lines()
            .map(|line| match line.strip_prefix("v ") {
                Some(coords) => {
                    let scaled: Vec<String> = coords
                        .split_whitespace()
                        .map(|c| (c.parse::<f32>().unwrap() * half).to_string())
                        .collect();
                    format!("v {}", scaled.join(" "))
                }
                None => line.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    const TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "parent", "translation": [0, 2, 0], "children": [1] },
                  { "name": "leaf", "mesh": 0 }],
        "meshes": [{ "name": "tri", "primitives": [{ "attributes": { "POSITION": 0 }, "material": 0 }] }],
        "materials": [{ "name": "red", "pbrMetallicRoughness": { "baseColorFactor": [1, 0, 0, 1] } }],
        "accessors": [{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                        "min": [0, 0, 0], "max": [1, 1, 0] }],
        "bufferViews": [{ "buffer": 0, "byteLength": 36 }],
        "buffers": [{ "byteLength": 36,
                      "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA" }]
    }"#;

    #[test]
    fn test_obj_quads_are_triangulated() {
        let model = decode_model(ModelFormat::Obj, CUBE_OBJ.as_bytes(), None).unwrap();
        assert_eq!(model.nodes.len(), 1);
        assert_eq!(model.meshes[0].name, "cube");
        assert_eq!(model.triangle_count(), 12);
        assert!(model.materials.is_empty());
    }

    #[test]
    fn test_obj_with_mtl_next_to_it() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cube.mtl"),
            "newmtl paint\nKd 0.2 0.4 0.6\nd 0.5\n",
        )
        .unwrap();
        let obj = format!("mtllib cube.mtl\nusemtl paint\n{}", CUBE_OBJ);

        let model = decode_model(ModelFormat::Obj, obj.as_bytes(), Some(dir.path())).unwrap();
        assert_eq!(model.materials.len(), 1);
        assert_eq!(model.materials[0].base_color, [0.2, 0.4, 0.6, 0.5]);
        assert_eq!(model.meshes[0].material, Some(0));
    }

    #[test]
    fn test_gltf_hierarchy_and_material() {
        let model = decode_model(ModelFormat::Gltf, TRIANGLE_GLTF.as_bytes(), None).unwrap();

        assert_eq!(model.nodes.len(), 2);
        assert_eq!(model.nodes[0].name, "parent");
        assert_eq!(model.nodes[0].transform.translation, Vector3::new(0.0, 2.0, 0.0));
        assert_eq!(model.nodes[1].parent, Some(0));
        assert_eq!(model.nodes[1].meshes, vec![0]);

        assert_eq!(model.meshes[0].indices, vec![0, 1, 2]);
        assert!(model.meshes[0].normals.is_empty());
        assert_eq!(model.materials[0].base_color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_gltf_nodes_are_listed_parents_first_in_document_order() {
        let json = TRIANGLE_GLTF.replace(
            r#""scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "parent", "translation": [0, 2, 0], "children": [1] },
                  { "name": "leaf", "mesh": 0 }],"#,
            r#""scenes": [{ "nodes": [0, 3] }],
        "nodes": [{ "name": "a", "children": [1, 2] },
                  { "name": "a1", "mesh": 0 },
                  { "name": "a2", "mesh": 0 },
                  { "name": "b", "mesh": 0 }],"#,
        );
        assert_ne!(json, TRIANGLE_GLTF);

        let model = decode_model(ModelFormat::Gltf, json.as_bytes(), None).unwrap();
        let order: Vec<(&str, Option<usize>)> = model
            .nodes
            .iter()
            .map(|n| (n.name.as_str(), n.parent))
            .collect();
        assert_eq!(
            order,
            vec![("a", None), ("a1", Some(0)), ("a2", Some(0)), ("b", None)]
        );
    }

    #[test]
    fn test_ascii_stl() {
        let stl = "solid tri
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
endsolid tri
";
        let model = decode_model(ModelFormat::Stl, stl.as_bytes(), None).unwrap();
        let mesh = &model.meshes[0];
        assert_eq!(mesh.positions, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(mesh.normals[..3], [0.0, 0.0, 1.0]);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_binary_stl_even_with_solid_header() {
        let mut bytes = b"solid but actually binary".to_vec();
        bytes.resize(STL_HEADER_LEN, 0);
        bytes.extend(1u32.to_le_bytes());
        for value in [0.0f32, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bytes.extend(value.to_le_bytes());
        }
        bytes.extend(0u16.to_le_bytes());

        let model = decode_model(ModelFormat::Stl, &bytes, None).unwrap();
        assert_eq!(model.triangle_count(), 1);
        assert_eq!(model.meshes[0].positions[3..6], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(
            decode_model(ModelFormat::Stl, b"garbage", None),
            Err(AssetDecodeError::Malformed { .. })
        ));
        assert!(matches!(
            decode_model(ModelFormat::Stl, b"solid x\nfacet normal 0 0 1\nvertex 0 0\n", None),
            Err(AssetDecodeError::Malformed { .. })
        ));
        assert!(matches!(
            decode_model(ModelFormat::Gltf, b"{ not json", None),
            Err(AssetDecodeError::Malformed { .. })
        ));
        assert!(matches!(
            decode_model(ModelFormat::Obj, b"# nothing here\n", None),
            Err(AssetDecodeError::Empty)
        ));
    }

    #[cfg(not(feature = "fbx"))]
    #[test]
    fn test_fbx_needs_feature() {
        assert!(matches!(
            decode_model(ModelFormat::Fbx, b"Kaydara FBX Binary", None),
            Err(AssetDecodeError::Unsupported(ModelFormat::Fbx))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_indices() {
        let model = DecodedModel {
            nodes: vec![DecodedNode {
                name: "n".into(),
                parent: None,
                transform: Transform::default(),
                meshes: vec![0],
            }],
            meshes: vec![DecodedMesh {
                name: "m".into(),
                positions: vec![0.0; 9],
                indices: vec![0, 1, 7],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(model.validate(ModelFormat::Obj).is_err());
    }
}
