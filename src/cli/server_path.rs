use std::path::PathBuf;

pub fn to_server_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name("clickspan-server");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}
